/// This test should FAIL to compile
/// Attempting to re-exec while still root

use wizarr_entrypoint::exec::handoff::Handoff;
use wizarr_entrypoint::testing::{FakeAccounts, RecordingOwnership};
use wizarr_entrypoint::EntrypointConfig;

fn main() {
    let mut accounts = FakeAccounts::alpine_base();
    let handoff = Handoff::reconcile(EntrypointConfig::default(), &mut accounts)
        .expect("reconcile failed")
        .apply_ownership(&RecordingOwnership::new())
        .expect("chown failed");

    // This should fail: OwnershipApplied doesn't have reexec
    let _ = handoff.reexec(&[]);
}
