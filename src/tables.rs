use comfy_table::{Attribute, Cell, CellAlignment, Table, modifiers, presets};

use crate::{
    api::{
        home_assistant::{LastStatistic, PriceState},
        provider::IntervalReading,
    },
    cli::sync::SyncSummary,
};

#[must_use]
pub fn build_sync_table(summaries: &[SyncSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Meter", "Statistic id", "Points", "From", "To", "Last sum"]);
    for summary in summaries {
        table.add_row(vec![
            Cell::new(&summary.name),
            Cell::new(&summary.statistic_id).add_attribute(Attribute::Dim),
            Cell::new(summary.n_points).set_alignment(CellAlignment::Right),
            Cell::new(summary.since.format("%Y-%m-%d %H:%M")),
            Cell::new(summary.until.format("%Y-%m-%d %H:%M")),
            Cell::new(&summary.last_sum).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Raw gateway readings, as returned.
#[must_use]
pub fn build_readings_table(readings: &[IntervalReading]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Date", "Value", "Interval"]);
    for reading in readings {
        table.add_row(vec![
            Cell::new(&reading.date),
            Cell::new(reading.value).set_alignment(CellAlignment::Right),
            Cell::new(reading.interval_length.as_deref().unwrap_or(""))
                .add_attribute(Attribute::Dim),
        ]);
    }
    table
}

#[must_use]
pub fn build_last_statistic_table(statistic: &LastStatistic) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Start", "State", "Sum"]);
    table.add_row(vec![
        Cell::new(statistic.start.format("%Y-%m-%d %H:%M")),
        Cell::new(statistic.state.map_or_else(String::new, |state| state.to_string()))
            .set_alignment(CellAlignment::Right),
        Cell::new(statistic.sum).set_alignment(CellAlignment::Right),
    ]);
    table
}

#[must_use]
pub fn build_price_table(states: &[PriceState]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Since", "Price", "Unit"]);
    for state in states {
        table.add_row(vec![
            Cell::new(state.last_updated_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(state.value).set_alignment(CellAlignment::Right),
            Cell::new(state.attributes.unit_of_measurement.as_deref().unwrap_or(""))
                .add_attribute(Attribute::Dim),
        ]);
    }
    table
}
