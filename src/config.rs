use std::path::PathBuf;

use crate::blend::DEFAULT_PRIOR_SEASON_WEIGHT;
use crate::error::FeatureError;

pub const DEFAULT_DB_PATH: &str = "data/nhl.sqlite";
pub const DEFAULT_EXPORT_PATH: &str = "data/processed/features.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub prior_season_weight: u32,
    /// Seasons whose team states and snapshot are recomputed.
    pub seasons: Vec<i32>,
    /// Seasons that get feature rows. Each one needs the previous season processed.
    pub feature_seasons: Vec<i32>,
    pub training_seasons: Vec<i32>,
    pub db_path: PathBuf,
    pub export_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prior_season_weight: DEFAULT_PRIOR_SEASON_WEIGHT,
            seasons: (2010..=2020).collect(),
            feature_seasons: (2011..=2020).collect(),
            training_seasons: (2011..=2016).collect(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `NHL_*` environment variables. Blank values are ignored.
    pub fn from_env() -> Result<Self, FeatureError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FeatureError> {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var("NHL_DB_PATH") {
            config.db_path = PathBuf::from(raw.trim());
        }
        if let Some(raw) = var("NHL_EXPORT_PATH") {
            config.export_path = PathBuf::from(raw.trim());
        }
        if let Some(raw) = var("NHL_PRIOR_SEASON_WEIGHT") {
            config.prior_season_weight = parse_weight(&raw)?;
        }
        if let Some(raw) = var("NHL_SEASONS") {
            config.seasons = parse_seasons(&raw)?;
        }
        if let Some(raw) = var("NHL_FEATURE_SEASONS") {
            config.feature_seasons = parse_seasons(&raw)?;
        }
        if let Some(raw) = var("NHL_TRAINING_SEASONS") {
            config.training_seasons = parse_seasons(&raw)?;
        }
        Ok(config)
    }

    /// Applies `--flag value` / `--flag=value` command-line overrides.
    /// Flags this config does not know are left for the caller.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), FeatureError> {
        if let Some(raw) = flag_value(args, "--db")? {
            self.db_path = PathBuf::from(raw);
        }
        if let Some(raw) = flag_value(args, "--out")? {
            self.export_path = PathBuf::from(raw);
        }
        if let Some(raw) = flag_value(args, "--weight")? {
            self.prior_season_weight = parse_weight(&raw)?;
        }
        if let Some(raw) = flag_value(args, "--seasons")? {
            self.seasons = parse_seasons(&raw)?;
        }
        if let Some(raw) = flag_value(args, "--feature-seasons")? {
            self.feature_seasons = parse_seasons(&raw)?;
        }
        if let Some(raw) = flag_value(args, "--training-seasons")? {
            self.training_seasons = parse_seasons(&raw)?;
        }
        Ok(())
    }
}

/// Value of `flag`, given either as `--flag=value` or `--flag value`.
pub fn flag_value(args: &[String], flag: &str) -> Result<Option<String>, FeatureError> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            return non_blank(flag, raw).map(Some);
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                return Err(FeatureError::Config(format!("{flag} needs a value")));
            };
            return non_blank(flag, next).map(Some);
        }
    }
    Ok(None)
}

fn non_blank(flag: &str, raw: &str) -> Result<String, FeatureError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with("--") {
        return Err(FeatureError::Config(format!("{flag} needs a value")));
    }
    Ok(trimmed.to_string())
}

fn parse_weight(raw: &str) -> Result<u32, FeatureError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| FeatureError::Config(format!("invalid prior season weight {raw:?}")))
}

/// Parses `2011,2013` and `2011-2016` (mixed freely), sorted and deduplicated.
pub fn parse_seasons(raw: &str) -> Result<Vec<i32>, FeatureError> {
    let invalid = || FeatureError::Config(format!("invalid season list {raw:?}"));
    let mut out = Vec::new();
    for part in raw.split([',', ';', ' ']).map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = start.trim().parse::<i32>().map_err(|_| invalid())?;
                let end = end.trim().parse::<i32>().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                out.extend(start..=end);
            }
            None => out.push(part.parse::<i32>().map_err(|_| invalid())?),
        }
    }
    if out.is_empty() {
        return Err(invalid());
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{PipelineConfig, parse_seasons};
    use crate::error::FeatureError;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_lists_and_ranges() {
        assert_eq!(parse_seasons("2011-2013").unwrap(), vec![2011, 2012, 2013]);
        assert_eq!(
            parse_seasons("2018, 2011-2012,2011").unwrap(),
            vec![2011, 2012, 2018]
        );
        assert!(parse_seasons("2016-2011").is_err());
        assert!(parse_seasons("twenty").is_err());
        assert!(parse_seasons(" ").is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("NHL_DB_PATH", "/tmp/x.sqlite"),
            ("NHL_PRIOR_SEASON_WEIGHT", "4"),
            ("NHL_FEATURE_SEASONS", "2015-2016"),
            ("NHL_SEASONS", ""),
        ]);
        let config =
            PipelineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.prior_season_weight, 4);
        assert_eq!(config.feature_seasons, vec![2015, 2016]);
        assert_eq!(config.seasons, PipelineConfig::default().seasons);
    }

    #[test]
    fn bad_weight_is_a_config_error() {
        let err = PipelineConfig::from_lookup(|key| {
            (key == "NHL_PRIOR_SEASON_WEIGHT").then(|| "-3".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, FeatureError::Config(_)));
    }

    #[test]
    fn args_take_both_forms() {
        let mut config = PipelineConfig::default();
        config
            .apply_args(&args(&["--weight=0", "--seasons", "2012-2013", "--out", "a.csv"]))
            .unwrap();
        assert_eq!(config.prior_season_weight, 0);
        assert_eq!(config.seasons, vec![2012, 2013]);
        assert_eq!(config.export_path, PathBuf::from("a.csv"));

        assert!(config.apply_args(&args(&["--db"])).is_err());
        assert!(config.apply_args(&args(&["--db", "--weight=2"])).is_err());
    }
}
