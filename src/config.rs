use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "schoold.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchoolConfig {
    pub year_levels: Vec<String>,
    pub sections: Vec<String>,
    pub default_school_year: String,
    pub password_length: usize,
    pub domains: EmailDomains,
    pub attendance: AttendanceWindow,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmailDomains {
    pub teacher: String,
    pub student: String,
    pub parent: String,
}

/// Hours (inclusive) used when backfilled attendance needs a time of day.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttendanceWindow {
    pub window_start_hour: u32,
    pub window_end_hour: u32,
}

impl Default for SchoolConfig {
    fn default() -> Self {
        Self {
            year_levels: ["1st", "2nd", "3rd", "4th"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sections: ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            default_school_year: "2024-2025".to_string(),
            password_length: 8,
            domains: EmailDomains::default(),
            attendance: AttendanceWindow::default(),
        }
    }
}

impl Default for EmailDomains {
    fn default() -> Self {
        Self {
            teacher: "teacher.isufst.com".to_string(),
            student: "student.isufst.com".to_string(),
            parent: "parent.isufst.com".to_string(),
        }
    }
}

impl Default for AttendanceWindow {
    fn default() -> Self {
        Self {
            window_start_hour: 8,
            window_end_hour: 17,
        }
    }
}

impl SchoolConfig {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let cfg: SchoolConfig = toml::from_str(raw).context("invalid schoold.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads `<workspace>/schoold.toml`, falling back to defaults when absent.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        Self::parse(&raw)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.year_levels.is_empty() {
            anyhow::bail!("year_levels must not be empty");
        }
        if self.sections.is_empty() {
            anyhow::bail!("sections must not be empty");
        }
        if self.password_length < 6 {
            anyhow::bail!("password_length must be at least 6");
        }
        let w = &self.attendance;
        if w.window_start_hour > w.window_end_hour || w.window_end_hour > 23 {
            anyhow::bail!("attendance window must satisfy start <= end <= 23");
        }
        Ok(())
    }

    pub fn is_year_level(&self, year: &str) -> bool {
        self.year_levels.iter().any(|y| y == year)
    }

    pub fn is_section(&self, section: &str) -> bool {
        self.sections.iter().any(|s| s == section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = SchoolConfig::parse("").expect("parse");
        assert_eq!(cfg, SchoolConfig::default());
        assert!(cfg.is_year_level("3rd"));
        assert!(cfg.is_section("b"));
        assert!(!cfg.is_section("z"));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let cfg = SchoolConfig::parse(
            r#"
            sections = ["x", "y"]

            [attendance]
            window_end_hour = 12
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.sections, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(cfg.attendance.window_start_hour, 8);
        assert_eq!(cfg.attendance.window_end_hour, 12);
        assert_eq!(cfg.domains.parent, "parent.isufst.com");
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = SchoolConfig::parse("[attendance]\nwindow_start_hour = 18\nwindow_end_hour = 9\n")
            .expect_err("inverted window");
        assert!(err.to_string().contains("attendance window"));
    }
}
