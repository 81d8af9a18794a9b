pub mod enedis;
pub mod home_assistant;
pub mod provider;
