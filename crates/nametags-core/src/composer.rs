//! Label composition: template lines through the host's formatter, empty
//! lines dropped, the rest joined with newlines.
//!
//! Formatting may call into placeholder plugins, so it runs on a small
//! dedicated `rayon` pool and reports back through a callback.

use std::sync::Arc;

use nametags_api::{FormatError, PlayerView, TextFormatter};
use nametags_proto::text::TextComponent;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::NametagSettings;
use crate::error::NametagError;

pub type ComposeResult = Result<TextComponent, FormatError>;

pub struct LabelComposer {
    formatter: Arc<dyn TextFormatter>,
    lines: Arc<[String]>,
    remove_empty_lines: bool,
    /// `None` composes on the calling thread.
    pool: Option<ThreadPool>,
}

impl LabelComposer {
    pub fn new(
        formatter: Arc<dyn TextFormatter>,
        settings: &NametagSettings,
    ) -> Result<Self, NametagError> {
        let pool = match settings.composer_threads {
            0 => None,
            n => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("nametags-composer-{i}"))
                    .build()?,
            ),
        };
        Ok(Self {
            formatter,
            lines: settings.lines.clone().into(),
            remove_empty_lines: settings.remove_empty_lines,
            pool,
        })
    }

    pub fn is_inline(&self) -> bool {
        self.pool.is_none()
    }

    /// Compose on the calling thread.
    pub fn compose(&self, player: &PlayerView) -> ComposeResult {
        compose_lines(
            self.formatter.as_ref(),
            &self.lines,
            self.remove_empty_lines,
            player,
        )
    }

    /// Compose on the pool and hand the result to `done` there.
    pub fn compose_async<F>(&self, player: PlayerView, done: F)
    where
        F: FnOnce(ComposeResult) + Send + 'static,
    {
        let Some(pool) = &self.pool else {
            done(self.compose(&player));
            return;
        };
        let formatter = Arc::clone(&self.formatter);
        let lines = Arc::clone(&self.lines);
        let remove_empty = self.remove_empty_lines;
        pool.spawn(move || {
            done(compose_lines(formatter.as_ref(), &lines, remove_empty, &player));
        });
    }
}

fn compose_lines(
    formatter: &dyn TextFormatter,
    lines: &[String],
    remove_empty: bool,
    player: &PlayerView,
) -> ComposeResult {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let text = formatter.format(player, line)?;
        if remove_empty && text.is_empty() {
            continue;
        }
        out.push(text);
    }
    Ok(TextComponent::join_lines(out))
}

// ─── Plain formatter ─────────────────────────────────────────────────────────

/// Substitutes `{name}`, `{world}` and `{game_mode}`. Any other `{...}` is
/// rejected so a typo in the template shows up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFormatter;

impl TextFormatter for PlainFormatter {
    fn format(&self, player: &PlayerView, line: &str) -> Result<TextComponent, FormatError> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let Some(len) = rest[start..].find('}') else {
                return Err(FormatError::Template {
                    line: line.to_string(),
                    reason: "unclosed '{'".into(),
                });
            };
            let key = &rest[start + 1..start + len];
            match key {
                "name" => out.push_str(&player.name),
                "world" => out.push_str(&player.world),
                "game_mode" => out.push_str(&player.game_mode.to_string()),
                other => {
                    return Err(FormatError::Placeholder {
                        placeholder: other.to_string(),
                        reason: "unknown placeholder".into(),
                    })
                }
            }
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        Ok(TextComponent::plain(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nametags_api::{GameMode, Platform};
    use nametags_proto::types::{Uuid, Vec3};
    use std::sync::mpsc;
    use std::time::Duration;

    fn steve() -> PlayerView {
        PlayerView {
            id: Uuid::from_u128(1),
            name: "Steve".into(),
            entity_id: 1,
            world: "world".into(),
            position: Vec3::ZERO,
            online: true,
            dead: false,
            game_mode: GameMode::Creative,
            platform: Platform::Java,
        }
    }

    fn settings(lines: &[&str], threads: usize) -> NametagSettings {
        NametagSettings {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            composer_threads: threads,
            ..Default::default()
        }
    }

    #[test]
    fn plain_formatter_substitutes() {
        let text = PlainFormatter
            .format(&steve(), "{name} in {world} ({game_mode})")
            .unwrap();
        assert_eq!(text.plain_text(), "Steve in world (creative)");
    }

    #[test]
    fn plain_formatter_rejects_unknown_and_unclosed() {
        assert!(matches!(
            PlainFormatter.format(&steve(), "{rank}"),
            Err(FormatError::Placeholder { .. })
        ));
        assert!(matches!(
            PlainFormatter.format(&steve(), "{name"),
            Err(FormatError::Template { .. })
        ));
    }

    #[test]
    fn empty_lines_are_dropped() {
        let composer =
            LabelComposer::new(Arc::new(PlainFormatter), &settings(&["{name}", "", "hi"], 0))
                .unwrap();
        assert!(composer.is_inline());
        let label = composer.compose(&steve()).unwrap();
        assert_eq!(label.plain_text(), "Steve\nhi");
    }

    #[test]
    fn empty_lines_kept_when_disabled() {
        let mut s = settings(&["{name}", "", "hi"], 0);
        s.remove_empty_lines = false;
        let composer = LabelComposer::new(Arc::new(PlainFormatter), &s).unwrap();
        assert_eq!(composer.compose(&steve()).unwrap().plain_text(), "Steve\n\nhi");
    }

    #[test]
    fn failure_is_reported_not_panicked() {
        let composer =
            LabelComposer::new(Arc::new(PlainFormatter), &settings(&["{oops}"], 0)).unwrap();
        assert!(composer.compose(&steve()).is_err());
    }

    #[test]
    fn pooled_compose_delivers_on_worker() {
        let composer =
            LabelComposer::new(Arc::new(PlainFormatter), &settings(&["{name}"], 2)).unwrap();
        assert!(!composer.is_inline());
        let (tx, rx) = mpsc::channel();
        composer.compose_async(steve(), move |res| {
            let name = std::thread::current().name().map(str::to_string);
            tx.send((res.map(|t| t.plain_text()).ok(), name)).unwrap();
        });
        let (text, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(text.as_deref(), Some("Steve"));
        assert!(thread.unwrap_or_default().starts_with("nametags-composer-"));
    }
}
