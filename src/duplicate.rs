//! Duplicate-file decision engine
//!
//! Decides what happens when a file about to be copied already exists at the
//! destination. Automatic sends consult their own policy so they never pop a
//! prompt unless explicitly configured to defer to the manual one; manual
//! sends either resolve from policy or go through the prompt collaborator.
//! "Apply to all" answers become a sticky choice for the rest of the current
//! operation.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Policy for manual sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManualDuplicatePolicy {
    /// Ask the operator per duplicate
    #[default]
    Ask,
    /// Overwrite without asking
    Overwrite,
    /// Skip without asking
    Skip,
}

/// Policy for automatic sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoDuplicatePolicy {
    /// Skip duplicates silently
    Skip,
    /// Overwrite duplicates silently
    Overwrite,
    /// Defer to the manual policy
    #[default]
    UseManualPolicy,
}

/// Terminal decision for one duplicate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateDecision {
    Overwrite,
    Skip,
    /// Abort the remainder of the current project's file list
    Cancel,
}

/// Answers the prompt collaborator may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Overwrite,
    Skip,
    OverwriteAll,
    SkipAll,
    Cancel,
}

/// Collaborator that asks the operator about a duplicate file.
///
/// `offer_apply_to_all` is set for multi-file operations where an "All"
/// answer makes sense; implementations without a UI can ignore it.
pub trait DuplicatePrompt {
    fn ask(&self, file_name: &str, destination: &Path, offer_apply_to_all: bool) -> PromptResponse;
}

/// Headless prompt used when no operator is reachable: skips the duplicate,
/// and the rest of the operation when asked with apply-to-all
pub struct SkipAllPrompt;

impl DuplicatePrompt for SkipAllPrompt {
    fn ask(&self, _file_name: &str, _destination: &Path, offer_apply_to_all: bool) -> PromptResponse {
        if offer_apply_to_all {
            PromptResponse::SkipAll
        } else {
            PromptResponse::Skip
        }
    }
}

/// Sticky choice carried across the files of one top-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StickyChoice {
    #[default]
    Unset,
    Overwrite,
    Skip,
}

/// Stateful duplicate resolver, one per sync engine
pub struct DuplicateResolver {
    manual: ManualDuplicatePolicy,
    auto: AutoDuplicatePolicy,
    prompt: Box<dyn DuplicatePrompt>,
    sticky: StickyChoice,
}

impl DuplicateResolver {
    pub fn new(
        manual: ManualDuplicatePolicy,
        auto: AutoDuplicatePolicy,
        prompt: Box<dyn DuplicatePrompt>,
    ) -> Self {
        Self {
            manual,
            auto,
            prompt,
            sticky: StickyChoice::Unset,
        }
    }

    /// Forget the sticky choice. Called at the start of every top-level
    /// send operation.
    pub fn reset(&mut self) {
        self.sticky = StickyChoice::Unset;
    }

    /// Decide what to do about an already-existing destination file.
    /// Only called when the destination file exists.
    pub fn resolve(
        &mut self,
        file_name: &str,
        destination: &Path,
        is_auto: bool,
        is_batch: bool,
    ) -> DuplicateDecision {
        if is_auto {
            match self.auto {
                AutoDuplicatePolicy::Skip => return DuplicateDecision::Skip,
                AutoDuplicatePolicy::Overwrite => return DuplicateDecision::Overwrite,
                AutoDuplicatePolicy::UseManualPolicy => {}
            }
        }

        match self.manual {
            ManualDuplicatePolicy::Overwrite => return DuplicateDecision::Overwrite,
            ManualDuplicatePolicy::Skip => return DuplicateDecision::Skip,
            ManualDuplicatePolicy::Ask => {}
        }

        match self.sticky {
            StickyChoice::Overwrite => return DuplicateDecision::Overwrite,
            StickyChoice::Skip => return DuplicateDecision::Skip,
            StickyChoice::Unset => {}
        }

        let offer_apply_to_all = is_batch || is_auto;
        match self.prompt.ask(file_name, destination, offer_apply_to_all) {
            PromptResponse::Overwrite => DuplicateDecision::Overwrite,
            PromptResponse::Skip => DuplicateDecision::Skip,
            PromptResponse::OverwriteAll => {
                self.sticky = StickyChoice::Overwrite;
                DuplicateDecision::Overwrite
            }
            PromptResponse::SkipAll => {
                self.sticky = StickyChoice::Skip;
                DuplicateDecision::Skip
            }
            PromptResponse::Cancel => DuplicateDecision::Cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted prompt that counts how often it was consulted
    struct ScriptedPrompt {
        response: PromptResponse,
        calls: Arc<AtomicUsize>,
    }

    impl DuplicatePrompt for ScriptedPrompt {
        fn ask(&self, _: &str, _: &Path, _: bool) -> PromptResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
        }
    }

    fn resolver_with(
        manual: ManualDuplicatePolicy,
        auto: AutoDuplicatePolicy,
        response: PromptResponse,
    ) -> (DuplicateResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let prompt = ScriptedPrompt {
            response,
            calls: calls.clone(),
        };
        (
            DuplicateResolver::new(manual, auto, Box::new(prompt)),
            calls,
        )
    }

    #[test]
    fn test_auto_policy_resolves_without_prompt() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Ask,
            AutoDuplicatePolicy::Skip,
            PromptResponse::Overwrite,
        );

        let decision = resolver.resolve("a.stl", Path::new("/dest"), true, false);
        assert_eq!(decision, DuplicateDecision::Skip);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_auto_defers_to_manual_policy() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Overwrite,
            AutoDuplicatePolicy::UseManualPolicy,
            PromptResponse::Cancel,
        );

        let decision = resolver.resolve("a.stl", Path::new("/dest"), true, false);
        assert_eq!(decision, DuplicateDecision::Overwrite);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_ask_consults_prompt() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Ask,
            AutoDuplicatePolicy::UseManualPolicy,
            PromptResponse::Overwrite,
        );

        let decision = resolver.resolve("a.stl", Path::new("/dest"), false, false);
        assert_eq!(decision, DuplicateDecision::Overwrite);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_overwrite_all_becomes_sticky() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Ask,
            AutoDuplicatePolicy::UseManualPolicy,
            PromptResponse::OverwriteAll,
        );

        // First duplicate prompts; the next two reuse the sticky answer
        for _ in 0..3 {
            let decision = resolver.resolve("a.stl", Path::new("/dest"), false, true);
            assert_eq!(decision, DuplicateDecision::Overwrite);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_clears_sticky_choice() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Ask,
            AutoDuplicatePolicy::UseManualPolicy,
            PromptResponse::SkipAll,
        );

        resolver.resolve("a.stl", Path::new("/dest"), false, true);
        resolver.reset();
        resolver.resolve("b.stl", Path::new("/dest"), false, true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_is_not_sticky() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Ask,
            AutoDuplicatePolicy::UseManualPolicy,
            PromptResponse::Cancel,
        );

        let decision = resolver.resolve("a.stl", Path::new("/dest"), false, true);
        assert_eq!(decision, DuplicateDecision::Cancel);

        // A later duplicate in a fresh operation prompts again
        resolver.resolve("b.stl", Path::new("/dest"), false, true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_batch_non_ask_policy_skips_prompt() {
        let (mut resolver, calls) = resolver_with(
            ManualDuplicatePolicy::Skip,
            AutoDuplicatePolicy::UseManualPolicy,
            PromptResponse::Overwrite,
        );

        let decision = resolver.resolve("a.stl", Path::new("/dest"), false, true);
        assert_eq!(decision, DuplicateDecision::Skip);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_headless_prompt_skips() {
        let mut resolver = DuplicateResolver::new(
            ManualDuplicatePolicy::Ask,
            AutoDuplicatePolicy::UseManualPolicy,
            Box::new(SkipAllPrompt),
        );

        assert_eq!(
            resolver.resolve("a.stl", Path::new("/dest"), false, false),
            DuplicateDecision::Skip
        );
    }
}
