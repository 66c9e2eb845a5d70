/// This test should FAIL to compile
/// Attempting to reuse a state after it has been consumed

use wizarr_entrypoint::exec::handoff::Handoff;
use wizarr_entrypoint::testing::{FakeAccounts, RecordingOwnership};
use wizarr_entrypoint::EntrypointConfig;

fn main() {
    let mut accounts = FakeAccounts::alpine_base();
    let fixer = RecordingOwnership::new();
    let handoff = Handoff::reconcile(EntrypointConfig::default(), &mut accounts)
        .expect("reconcile failed");

    // First transition consumes handoff
    let _applied = handoff.apply_ownership(&fixer);

    // This should fail: handoff was moved and can no longer be used
    let _again = handoff.apply_ownership(&fixer);
}
