#![no_main]

use castkeeper_core::entities::CredentialRecord;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Record files come from disk and may be hand-edited; parsing and the
    // validity checks must never panic.
    if let Ok(record) = serde_json::from_str::<CredentialRecord>(data) {
        for credential in record.current.iter().chain(record.previous.iter()) {
            let _ = credential.is_expired();
            let _ = credential.expires_at();
            let _ = credential.masked();
        }
    }
});
