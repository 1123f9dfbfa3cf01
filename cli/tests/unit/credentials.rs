//! Credential decryption at use time, against a mocked secret store.

#![allow(clippy::unwrap_used)]

use dockhand_cli::application::services::credentials::resolve_credentials;
use dockhand_cli::domain::error::HostError;
use dockhand_common::HostAuth;
use mockall::predicate::eq;

use crate::mocks::{MockSecrets, host};

#[test]
fn each_secret_is_decrypted_once() {
    let mut secrets = MockSecrets::new();
    secrets
        .expect_decrypt()
        .with(eq("v1:pw"))
        .times(1)
        .returning(|_| Some("hunter2".to_string()));
    let mut h = host("h1");
    h.auth = HostAuth {
        password: Some("v1:pw".into()),
        ..HostAuth::default()
    };
    let creds = resolve_credentials(&h, &secrets).unwrap();
    assert_eq!(creds.password.as_deref(), Some("hunter2"));
    assert!(creds.private_key.is_none());
    assert!(creds.needs_password_helper());
}

#[test]
fn undecryptable_secret_names_the_field() {
    let mut secrets = MockSecrets::new();
    secrets.expect_decrypt().returning(|_| None);
    let mut h = host("h1");
    h.auth = HostAuth {
        private_key: Some("v1:broken".into()),
        ..HostAuth::default()
    };
    let err = resolve_credentials(&h, &secrets).unwrap_err();
    let host_err = err.downcast_ref::<HostError>().unwrap();
    assert!(matches!(host_err, HostError::Credential { field: "private key", .. }));
}

#[test]
fn host_without_auth_never_touches_the_store() {
    let mut secrets = MockSecrets::new();
    secrets.expect_decrypt().never();
    let creds = resolve_credentials(&host("h1"), &secrets).unwrap();
    assert!(!creds.needs_password_helper());
}
