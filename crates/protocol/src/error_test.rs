//! Tests for DeliveryError classification

use std::io;

use super::*;

#[test]
fn test_transient_is_retryable() {
    let err = DeliveryError::transient("disk hiccup");
    assert_eq!(err.kind(), ErrorKind::TransientIo);
    assert!(err.is_retryable());
}

#[test]
fn test_permanent_is_not_retryable() {
    let err = DeliveryError::permanent("bad path");
    assert_eq!(err.kind(), ErrorKind::PermanentTarget);
    assert!(!err.is_retryable());
}

#[test]
fn test_conflict_and_overflow_are_retryable() {
    assert!(DeliveryError::conflict("app.log").is_retryable());
    assert!(DeliveryError::overflow("queue full").is_retryable());
}

#[test]
fn test_shutdown_and_timeout_are_final() {
    assert!(!DeliveryError::Shutdown.is_retryable());
    assert!(!DeliveryError::timeout("drain").is_retryable());
    assert_eq!(DeliveryError::Shutdown.kind(), ErrorKind::Shutdown);
}

#[test]
fn test_retries_exhausted_is_permanent() {
    let err = DeliveryError::retries_exhausted(3, DeliveryError::transient("eio"));
    assert_eq!(err.kind(), ErrorKind::PermanentTarget);
    assert!(err.to_string().contains("3 attempts"));
    assert!(err.to_string().contains("eio"));
}

#[test]
fn test_io_permission_denied_is_permanent() {
    let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
    let err = DeliveryError::from_io("open /var/log/app.log", io_err);
    assert_eq!(err.kind(), ErrorKind::PermanentTarget);
    assert!(err.to_string().contains("/var/log/app.log"));
}

#[test]
fn test_io_storage_full_is_transient() {
    let err: DeliveryError = io::Error::new(io::ErrorKind::StorageFull, "no space").into();
    assert_eq!(err.kind(), ErrorKind::TransientIo);
}

#[test]
fn test_clone_keeps_source() {
    let io_err = io::Error::new(io::ErrorKind::Interrupted, "eintr");
    let err = DeliveryError::from_io("write", io_err);
    let cloned = err.clone();
    assert!(std::error::Error::source(&cloned).is_some());
}
