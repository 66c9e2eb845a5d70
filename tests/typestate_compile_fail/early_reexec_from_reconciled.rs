/// This test should FAIL to compile
/// Attempting to re-exec straight after reconciliation

use wizarr_entrypoint::exec::handoff::Handoff;
use wizarr_entrypoint::testing::FakeAccounts;
use wizarr_entrypoint::EntrypointConfig;

fn main() {
    let mut accounts = FakeAccounts::alpine_base();
    let handoff = Handoff::reconcile(EntrypointConfig::default(), &mut accounts)
        .expect("reconcile failed");

    // This should fail: AccountsReconciled doesn't have reexec
    // Only CredsDropped has this method
    let _ = handoff.reexec(&[]);
}
