/// This test should FAIL to compile
/// Attempting to drop credentials before the ownership set is chowned

use wizarr_entrypoint::exec::handoff::Handoff;
use wizarr_entrypoint::testing::FakeAccounts;
use wizarr_entrypoint::EntrypointConfig;

fn main() {
    let mut accounts = FakeAccounts::alpine_base();
    let handoff = Handoff::reconcile(EntrypointConfig::default(), &mut accounts)
        .expect("reconcile failed");

    // This should fail: AccountsReconciled doesn't have drop_credentials
    // Only OwnershipApplied has this method
    let _ = handoff.drop_credentials();
}
