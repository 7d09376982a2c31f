//! Output markers that drive watch-mode reactions.

use crate::stream::OutputLine;

/// Printed by the editor watcher when the client build starts watching.
pub const CLIENT_WATCH_MARKER: &str = "Starting watch-client";
/// Printed by the editor watcher after each compilation.
pub const COMPILATION_FINISHED_MARKER: &str = "Finished compilation";
/// Printed by the type-checker after each (re)compile.
pub const TYPE_CHECK_READY_MARKER: &str = "Watching for file changes";

/// Reaction requested by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Run the patch generator.
    AutoPatch,
    /// Restart the development server once the bundle is ready.
    RestartServer,
}

/// Editor watcher trigger state.
///
/// `Finished compilation` only counts after `Starting watch-client` has been
/// seen, and the patch generator fires at most once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorTrigger {
    /// Set once the client watch has started. Never cleared.
    pub client_watch_started: bool,
    /// Set once the patch generator has fired.
    pub auto_patch_fired: bool,
    auto_patch: bool,
}

impl EditorTrigger {
    /// Creates a trigger; `auto_patch` enables the patch generator.
    #[must_use]
    pub fn new(auto_patch: bool) -> Self {
        Self {
            auto_patch,
            ..Self::default()
        }
    }

    /// Evaluates one line of editor output.
    pub fn evaluate(&mut self, line: &OutputLine) -> Option<TriggerAction> {
        if line.contains(CLIENT_WATCH_MARKER) {
            self.client_watch_started = true;
            return None;
        }
        if self.client_watch_started
            && self.auto_patch
            && !self.auto_patch_fired
            && line.contains(COMPILATION_FINISHED_MARKER)
        {
            self.auto_patch_fired = true;
            return Some(TriggerAction::AutoPatch);
        }
        None
    }
}

/// Type-checker trigger. Stateless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeCheckTrigger;

impl TypeCheckTrigger {
    /// Evaluates one line of type-checker output.
    #[must_use]
    pub fn evaluate(&self, line: &OutputLine) -> Option<TriggerAction> {
        line.contains(TYPE_CHECK_READY_MARKER)
            .then_some(TriggerAction::RestartServer)
    }

    /// Returns true if the line should be echoed.
    #[must_use]
    pub fn should_echo(&self, line: &OutputLine) -> bool {
        !line.is_blank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> OutputLine {
        OutputLine::from_raw_bytes(text.as_bytes())
    }

    #[test]
    fn test_finished_before_client_watch_is_ignored() {
        let mut trigger = EditorTrigger::new(true);
        assert_eq!(trigger.evaluate(&line("[12:00:01] Finished compilation")), None);
        assert!(!trigger.auto_patch_fired);
    }

    #[test]
    fn test_auto_patch_fires_once() {
        let mut trigger = EditorTrigger::new(true);
        trigger.evaluate(&line("[12:00:00] Starting watch-client ..."));

        let fired: Vec<_> = (0..3)
            .filter_map(|_| {
                trigger.evaluate(&line("[12:00:05] Finished compilation with 0 errors"))
            })
            .collect();

        assert_eq!(fired, vec![TriggerAction::AutoPatch]);
        assert!(trigger.client_watch_started);
    }

    #[test]
    fn test_auto_patch_disabled() {
        let mut trigger = EditorTrigger::new(false);
        trigger.evaluate(&line("Starting watch-client"));
        assert_eq!(trigger.evaluate(&line("Finished compilation")), None);
        assert!(trigger.client_watch_started);
    }

    #[test]
    fn test_marker_matches_through_color_codes() {
        let mut trigger = EditorTrigger::new(true);
        trigger.evaluate(&line(
            "\u{1b}[90m[12:00:00]\u{1b}[39m Starting \u{1b}[36mwatch-client\u{1b}[39m",
        ));
        assert!(trigger.client_watch_started);
    }

    #[test]
    fn test_type_check_trigger() {
        let trigger = TypeCheckTrigger;
        assert_eq!(
            trigger.evaluate(&line("12:00:00 - Found 0 errors. Watching for file changes.")),
            Some(TriggerAction::RestartServer)
        );
        assert_eq!(
            trigger.evaluate(&line("12:00:00 - Starting compilation in watch mode...")),
            None
        );
        assert!(!trigger.should_echo(&line("   ")));
        assert!(trigger.should_echo(&line("src/node/cli.ts:1:1 - error")));
    }
}
