use std::path::Path;

use nametags_proto::packets::Billboard;
use serde::Deserialize;
use tracing::warn;

use crate::error::NametagError;

/// The client discards a passenger link for an entity it has not finished
/// loading; three ticks is the observed settling time, so the repeat must
/// come at least one tick later.
pub const MIN_ATTACH_RESEND_DELAY: u64 = 4;

#[derive(Debug, Default, Deserialize)]
pub struct NametagConfig {
    #[serde(default)]
    pub nametag: NametagSettings,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// What a spectator's own label does while they spectate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectatorPolicy {
    /// Entering spectator hides the label; leaving re-runs the add path.
    #[default]
    Hide,
    /// Spectators keep the normal label; entering re-runs the add path.
    Show,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NametagSettings {
    /// Force the vanilla name tag off for Java connections.
    pub disable_default_name_tag: bool,
    /// Force the vanilla name tag off for Bedrock connections.
    pub disable_default_name_tag_bedrock: bool,
    pub remove_empty_lines: bool,
    /// Label template, one entry per rendered line.
    pub lines: Vec<String>,
    pub billboard: Billboard,
    pub shadowed: bool,
    pub see_through: bool,
    /// ARGB.
    pub background_color: i32,
    pub y_offset: f32,
    pub view_range: f32,
    pub text_opacity: u8,
    /// Radius used by the bulk resync candidate search.
    pub nearby_radius: f64,
    /// Height above the owner's feet where a fresh display is placed.
    pub owner_anchor_height: f64,
    pub attach_resend_delay_ticks: u64,
    pub track_settle_delay_ticks: u64,
    pub join_delay_ticks: u64,
    pub respawn_delay_ticks: u64,
    pub refresh_interval_ticks: u64,
    /// Worker threads for label composition. 0 composes on the caller.
    pub composer_threads: usize,
    pub spectator_policy: SpectatorPolicy,
    /// Poll dead players every tick and re-add them once they stand again.
    pub respawn_watchdog: bool,
}

impl Default for NametagSettings {
    fn default() -> Self {
        Self {
            disable_default_name_tag: true,
            disable_default_name_tag_bedrock: true,
            remove_empty_lines: true,
            lines: vec!["{name}".into()],
            billboard: Billboard::Center,
            shadowed: false,
            see_through: false,
            background_color: 0x4000_0000,
            y_offset: 0.0,
            view_range: 1.0,
            text_opacity: 0xFF,
            nearby_radius: 100.0,
            owner_anchor_height: 1.8,
            attach_resend_delay_ticks: MIN_ATTACH_RESEND_DELAY,
            track_settle_delay_ticks: 3,
            join_delay_ticks: 1,
            respawn_delay_ticks: 1,
            refresh_interval_ticks: 20,
            composer_threads: 4,
            spectator_policy: SpectatorPolicy::Hide,
            respawn_watchdog: true,
        }
    }
}

impl NametagSettings {
    /// Clamp values the engine cannot honour.
    pub fn normalize(&mut self) {
        if self.attach_resend_delay_ticks < MIN_ATTACH_RESEND_DELAY {
            warn!(
                "attach_resend_delay_ticks = {} is below the client settling time, using {MIN_ATTACH_RESEND_DELAY}",
                self.attach_resend_delay_ticks
            );
            self.attach_resend_delay_ticks = MIN_ATTACH_RESEND_DELAY;
        }
        if self.refresh_interval_ticks == 0 {
            warn!("refresh_interval_ticks = 0, periodic refresh disabled");
        }
        if self.nearby_radius < 0.0 {
            self.nearby_radius = 0.0;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl NametagConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, NametagError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| NametagError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, NametagError> {
        let mut config: Self = toml::from_str(contents)?;
        config.nametag.normalize();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = NametagConfig::from_toml_str("").unwrap();
        let s = &config.nametag;
        assert!(s.disable_default_name_tag);
        assert!(s.disable_default_name_tag_bedrock);
        assert!(s.remove_empty_lines);
        assert_eq!(s.lines, vec!["{name}".to_string()]);
        assert_eq!(s.billboard, Billboard::Center);
        assert_eq!(s.nearby_radius, 100.0);
        assert_eq!(s.owner_anchor_height, 1.8);
        assert_eq!(s.attach_resend_delay_ticks, 4);
        assert_eq!(s.track_settle_delay_ticks, 3);
        assert_eq!(s.spectator_policy, SpectatorPolicy::Hide);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_section() {
        let toml_str = r#"
            [nametag]
            disable_default_name_tag = false
            lines = ["{name}", "", "&7{world}"]
            billboard = "vertical"
            shadowed = true
            background_color = 0
            view_range = 0.5
            nearby_radius = 48.0
            composer_threads = 2
            spectator_policy = "show"
            respawn_watchdog = false

            [logging]
            level = "debug"
        "#;
        let config = NametagConfig::from_toml_str(toml_str).unwrap();
        let s = &config.nametag;
        assert!(!s.disable_default_name_tag);
        assert!(s.disable_default_name_tag_bedrock);
        assert_eq!(s.lines.len(), 3);
        assert_eq!(s.billboard, Billboard::Vertical);
        assert!(s.shadowed);
        assert_eq!(s.background_color, 0);
        assert_eq!(s.nearby_radius, 48.0);
        assert_eq!(s.composer_threads, 2);
        assert_eq!(s.spectator_policy, SpectatorPolicy::Show);
        assert!(!s.respawn_watchdog);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn resend_delay_is_clamped() {
        let config = NametagConfig::from_toml_str(
            r#"
            [nametag]
            attach_resend_delay_ticks = 1
        "#,
        )
        .unwrap();
        assert_eq!(
            config.nametag.attach_resend_delay_ticks,
            MIN_ATTACH_RESEND_DELAY
        );
    }

    #[test]
    fn bad_type_is_an_error() {
        let result = NametagConfig::from_toml_str("[nametag]\nshadowed = \"yes\"\n");
        assert!(matches!(result, Err(NametagError::ConfigParse(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = NametagConfig::load("/definitely/not/here/nametags.toml").unwrap_err();
        assert!(err.to_string().contains("nametags.toml"));
    }
}
