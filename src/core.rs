pub mod cost;
pub mod normalize;
pub mod planner;
pub mod series;
