use std::path::Path;

use serde::Deserialize;

use crate::{core::cost::CostRule, prelude::*};

/// User configuration, one entry per meter.
#[derive(Debug, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub meters: Vec<MeterConfig>,
}

#[derive(Debug, Deserialize)]
pub struct MeterConfig {
    /// Meter delivery point identifier.
    pub prm: String,

    /// Gateway token scoped to the PRM.
    pub token: String,

    pub name: Option<String>,

    #[serde(default)]
    pub action: Action,

    #[serde(default)]
    pub production: bool,

    /// Ordered cost rules. Empty means no cost series.
    #[serde(default)]
    pub prices: Vec<CostRule>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Sync,
    Reset,
}

impl MeterConfig {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("Linky {}", self.mode()))
    }

    pub const fn mode(&self) -> &'static str {
        if self.production { "production" } else { "consumption" }
    }
}

impl UserConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let this: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        this.validate()?;
        Ok(this)
    }

    fn validate(&self) -> Result {
        for (index, meter) in self.meters.iter().enumerate() {
            if self.meters[..index]
                .iter()
                .any(|other| other.prm == meter.prm && other.production == meter.production)
            {
                bail!("PRM {} is configured multiple times in {} mode", meter.prm, meter.mode());
            }
            for rule in &meter.prices {
                match (&rule.price, &rule.entity_id) {
                    (Some(_), Some(_)) => {
                        bail!("PRM {}: `price` and `entity_id` are mutually exclusive", meter.prm);
                    }
                    (None, None) => {
                        bail!("PRM {}: either `price` or `entity_id` is required", meter.prm);
                    }
                    (None, Some(entity_id)) => {
                        ensure!(
                            rule.after.is_none()
                                && rule.before.is_none()
                                && rule.weekdays.is_empty(),
                            "PRM {}: time and weekday filters are not supported with `{entity_id}`",
                            meter.prm,
                        );
                    }
                    (Some(_), None) => {}
                }
                if let Some(start_date) = rule.start_date
                    && let Some(end_date) = rule.end_date
                {
                    ensure!(
                        start_date < end_date,
                        "PRM {}: `start_date` must precede `end_date`",
                        meter.prm,
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{core::cost::Weekday, quantity::rate::KilowattHourRate};

    fn parse(contents: &str) -> Result<UserConfig> {
        let config: UserConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_full_config_ok() -> Result {
        // language=TOML
        let config = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "the-token"
            name = "Main meter"

            [[meters.prices]]
            price = 0.2068
            after = "06:00"
            before = "22:00"
            weekdays = ["mon", "tue", "wed", "thu", "fri"]
            start_date = "2024-01-01"
            end_date = "2025-01-01"

            [[meters.prices]]
            entity_id = "sensor.electricity_price"

            [[meters]]
            prm = "98765432109876"
            token = "another-token"
            action = "reset"
            production = true
            "#,
        )?;

        assert_eq!(config.meters.len(), 2);

        let meter = &config.meters[0];
        assert_eq!(meter.prm, "12345678901234");
        assert_eq!(meter.display_name(), "Main meter");
        assert_eq!(meter.action, Action::Sync);
        assert!(!meter.production);
        assert_eq!(meter.prices.len(), 2);

        let rule = &meter.prices[0];
        assert_eq!(rule.price, Some(KilowattHourRate::from(0.2068)));
        assert_eq!(rule.after.map(|after| after.to_string()).as_deref(), Some("06:00:00"));
        assert_eq!(rule.before.map(|before| before.to_string()).as_deref(), Some("22:00:00"));
        assert_eq!(
            rule.weekdays,
            Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri,
        );
        assert_eq!(rule.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(rule.end_date, NaiveDate::from_ymd_opt(2025, 1, 1));

        assert_eq!(meter.prices[1].entity_id.as_deref(), Some("sensor.electricity_price"));

        let production = &config.meters[1];
        assert_eq!(production.display_name(), "Linky production");
        assert_eq!(production.action, Action::Reset);
        assert_eq!(production.mode(), "production");
        Ok(())
    }

    #[test]
    fn test_duplicate_prm_in_the_same_mode_fails() {
        // language=TOML
        let error = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters]]
            prm = "12345678901234"
            token = "b"
            "#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("multiple times in consumption mode"));
    }

    #[test]
    fn test_same_prm_in_different_modes_ok() -> Result {
        // language=TOML
        let config = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters]]
            prm = "12345678901234"
            token = "a"
            production = true
            "#,
        )?;
        assert_eq!(config.meters.len(), 2);
        Ok(())
    }

    #[test]
    fn test_price_and_entity_are_mutually_exclusive() {
        // language=TOML
        let error = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters.prices]]
            price = 0.2
            entity_id = "sensor.electricity_price"
            "#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_rule_requires_price_or_entity() {
        // language=TOML
        let error = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters.prices]]
            after = "06:00"
            "#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("either `price` or `entity_id` is required"));
    }

    #[test]
    fn test_entity_rule_rejects_time_filters() {
        // language=TOML
        let error = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters.prices]]
            entity_id = "sensor.electricity_price"
            weekdays = ["sat", "sun"]
            "#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("filters are not supported"));
    }

    #[test]
    fn test_entity_rule_allows_dates_ok() -> Result {
        // language=TOML
        parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters.prices]]
            entity_id = "sensor.electricity_price"
            start_date = "2024-01-01"
            "#,
        )?;
        Ok(())
    }

    #[test]
    fn test_start_date_must_precede_end_date() {
        // language=TOML
        let error = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters.prices]]
            price = 0.2
            start_date = "2025-01-01"
            end_date = "2024-01-01"
            "#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("`start_date` must precede `end_date`"));
    }

    #[test]
    fn test_invalid_time_bound_fails() {
        // language=TOML
        let error = parse(
            r#"
            [[meters]]
            prm = "12345678901234"
            token = "a"

            [[meters.prices]]
            price = 0.2
            after = "7h30"
            "#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("input contains invalid characters"));
    }
}
