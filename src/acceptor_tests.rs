// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn retry_after_hint_only_set_for_admission_denials() {
    assert_eq!(retry_after_hint(ErrorCode::GlobalCap), Some(ADMISSION_RETRY_AFTER_MS));
    assert_eq!(retry_after_hint(ErrorCode::PerCredentialCap), Some(ADMISSION_RETRY_AFTER_MS));
    assert_eq!(retry_after_hint(ErrorCode::AuthMalformed), None);
    assert_eq!(retry_after_hint(ErrorCode::UnknownSession), None);
}

#[test]
fn describe_covers_every_error_code() {
    for code in [
        ErrorCode::AuthMalformed,
        ErrorCode::AuthRejected,
        ErrorCode::GlobalCap,
        ErrorCode::PerCredentialCap,
        ErrorCode::UnknownSession,
        ErrorCode::DigestMismatch,
        ErrorCode::SessionBusy,
        ErrorCode::ProvisionFailed,
        ErrorCode::ShellFailed,
        ErrorCode::TransportFailed,
        ErrorCode::Internal,
    ] {
        assert!(!describe(code).is_empty());
    }
}
