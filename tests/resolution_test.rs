//! Integration tests for configuration loading and name resolution.

mod common;

use common::{SCRIPTED_PROVIDER, ScriptedDriver, TestConfig, scripted_entry, sqlite_entry};
use dbhelper::db::ConnectionFactory;
use dbhelper::error::DbError;
use dbhelper::models::{ConfigFileEntry, DatabaseEntry, DatabaseType};
use dbhelper::{CipherError, DbContext, KeyPair};
use std::sync::Arc;

#[test]
fn test_only_active_detail_file_is_visible() {
    let config = TestConfig::new(&[]);
    config.write_detail("A.json", &[scripted_entry("alpha")]);
    config.write_detail("B.json", &[scripted_entry("beta"), scripted_entry("gamma")]);
    config.write_list(&[
        ConfigFileEntry::new("A.json", false),
        ConfigFileEntry::new("B.json", true).with_description("current"),
    ]);
    let ctx = config.scripted_context(&ScriptedDriver::new());

    let names: Vec<String> = ctx
        .databases()
        .unwrap()
        .iter()
        .map(|d| d.name.clone())
        .collect();
    assert_eq!(names, vec!["beta", "gamma"]);
    assert!(matches!(
        ctx.session("alpha"),
        Err(DbError::DatabaseNotConfigured { .. })
    ));
    assert!(ctx.session("GAMMA").is_ok());
}

#[test]
fn test_missing_config_list() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = DbContext::builder()
        .config_path(dir.path().join("DbConfig.json"))
        .base_dir(dir.path())
        .without_builtin_providers()
        .build()
        .unwrap();
    let err = ctx.session("main").unwrap_err();
    assert!(matches!(err, DbError::ConfigNotFound { .. }));
    assert!(err.suggestion().is_some());
}

#[test]
fn test_config_found_in_base_dir() {
    let config = TestConfig::new(&[scripted_entry("main")]);
    let driver = ScriptedDriver::new();
    let ctx = DbContext::builder()
        .config_path("DbConfig.json")
        .base_dir(config.dir.path())
        .provider(SCRIPTED_PROVIDER, driver)
        .build()
        .unwrap();
    assert_eq!(ctx.databases().unwrap().len(), 1);
}

#[test]
fn test_provider_handle_is_cached_across_changes() {
    let config = TestConfig::new(&[scripted_entry("main")]);
    let ctx = config.scripted_context(&ScriptedDriver::new());

    let first = ctx.resolve_provider("main").unwrap();

    // Neither a rewritten detail file nor a replaced factory affects it.
    config.write_detail("DbDetail.json", &[sqlite_entry("main", "sqlite::memory:")]);
    ctx.register_provider(SCRIPTED_PROVIDER, ScriptedDriver::new());

    let second = ctx.resolve_provider("MAIN").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.database_type(), DatabaseType::Other);
}

#[test]
fn test_connection_string_is_cached() {
    let config = TestConfig::new(&[sqlite_entry("main", "sqlite:first.db")]);
    let ctx = config.context();

    assert_eq!(ctx.resolve_connection_string("main").unwrap(), "sqlite:first.db");
    config.write_detail("DbDetail.json", &[sqlite_entry("main", "sqlite:second.db")]);
    assert_eq!(ctx.resolve_connection_string("Main").unwrap(), "sqlite:first.db");
}

#[test]
fn test_unknown_provider_fails_load_when_strict() {
    let config = TestConfig::new(&[DatabaseEntry::new(
        "main",
        DatabaseType::SQLite,
        "no-such-provider",
        "sqlite::memory:",
    )]);
    let ctx = config.context();
    assert!(matches!(
        ctx.databases(),
        Err(DbError::ProviderResolutionFailure { .. })
    ));
}

#[test]
fn test_unknown_provider_is_not_cached() {
    let config = TestConfig::new(&[DatabaseEntry::new(
        "main",
        DatabaseType::Other,
        "late",
        "scripted://memory",
    )]);
    let ctx = DbContext::builder()
        .config_path(config.config_path())
        .strict_providers(false)
        .without_builtin_providers()
        .build()
        .unwrap();

    let err = ctx.resolve_provider("main").unwrap_err();
    assert!(matches!(
        err,
        DbError::ProviderResolutionFailure { ref provider, .. } if provider == "late"
    ));
    assert!(!ctx.provider_resolver().is_cached("main"));

    // A factory registered afterwards is picked up on the next call.
    ctx.register_provider("late", ScriptedDriver::new());
    assert!(ctx.resolve_provider("main").is_ok());
    assert!(ctx.provider_resolver().is_cached("main"));
}

#[test]
fn test_plain_connection_string_passes_through() {
    let config = TestConfig::new(&[scripted_entry("main")]);
    let ctx = config.scripted_context(&ScriptedDriver::new());
    assert_eq!(
        ctx.resolve_connection_string("main").unwrap(),
        "scripted://memory"
    );
}

fn rot13(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        })
        .collect()
}

struct Rot13;

impl dbhelper::Cipher for Rot13 {
    fn decrypt(&self, cipher_text: &str, private_key: &str) -> Result<String, CipherError> {
        if private_key != "private" {
            return Err(CipherError::new("key mismatch"));
        }
        Ok(rot13(cipher_text))
    }

    fn encrypt(&self, plain_text: &str, _public_key: &str) -> Result<String, CipherError> {
        Ok(rot13(plain_text))
    }
}

#[test]
fn test_encrypted_connection_string_is_decrypted_and_cached() {
    let config = TestConfig::new(&[]);
    let ctx_for_encrypt = DbContext::builder()
        .without_builtin_providers()
        .cipher(Rot13)
        .keys(KeyPair::new("public", "private"))
        .build()
        .unwrap();
    let cipher_text = ctx_for_encrypt
        .encrypt_connection_string("scripted://memory")
        .unwrap();
    assert_ne!(cipher_text, "scripted://memory");

    config.write_detail(
        "DbDetail.json",
        &[DatabaseEntry::new("vault", DatabaseType::Other, SCRIPTED_PROVIDER, &cipher_text)
            .encrypted(true)],
    );
    let ctx = DbContext::builder()
        .config_path(config.config_path())
        .provider(SCRIPTED_PROVIDER, ScriptedDriver::new())
        .cipher(Rot13)
        .keys(KeyPair::new("public", "private"))
        .build()
        .unwrap();

    assert_eq!(
        ctx.resolve_connection_string("vault").unwrap(),
        "scripted://memory"
    );
    assert!(ctx.connection_string_resolver().is_cached("vault"));
}

#[test]
fn test_encrypted_connection_string_without_key() {
    let config = TestConfig::new(&[scripted_entry("vault").encrypted(true)]);
    let ctx = DbContext::builder()
        .config_path(config.config_path())
        .provider(SCRIPTED_PROVIDER, ScriptedDriver::new())
        .cipher(Rot13)
        .build()
        .unwrap();

    assert!(matches!(
        ctx.session("vault"),
        Err(DbError::DecryptionFailure { .. })
    ));
    assert!(!ctx.connection_string_resolver().is_cached("vault"));
}

#[test]
fn test_duplicate_names_rejected() {
    let config = TestConfig::new(&[scripted_entry("main"), scripted_entry("Main")]);
    let ctx = config.scripted_context(&ScriptedDriver::new());
    assert!(matches!(
        ctx.databases(),
        Err(DbError::InvalidConfig { .. })
    ));
}

#[test]
fn test_names_differing_only_in_unicode_case_are_duplicates() {
    let config = TestConfig::new(&[
        sqlite_entry("Äpfel", "sqlite:a.db"),
        sqlite_entry("äpfel", "sqlite:b.db"),
    ]);
    let ctx = config.context();

    assert!(matches!(
        ctx.resolve_connection_string("äpfel"),
        Err(DbError::InvalidConfig { .. })
    ));
    assert!(!ctx.connection_string_resolver().is_cached("äpfel"));
}

#[test]
fn test_unicode_name_resolves_to_its_own_entry() {
    let config = TestConfig::new(&[
        sqlite_entry("Äpfel", "sqlite:a.db"),
        sqlite_entry("Birnen", "sqlite:b.db"),
    ]);
    let ctx = config.context();

    assert_eq!(ctx.resolve_connection_string("äPFEL").unwrap(), "sqlite:a.db");
    assert_eq!(ctx.resolve_connection_string("birnen").unwrap(), "sqlite:b.db");
}

#[test]
fn test_padded_name_resolves_before_cache_fill() {
    let config = TestConfig::new(&[scripted_entry("main")]);
    let ctx = config.scripted_context(&ScriptedDriver::new());

    // The first lookup of the name uses the padded form.
    assert_eq!(
        ctx.resolve_connection_string(" main ").unwrap(),
        "scripted://memory"
    );
    assert!(ctx.resolve_provider(" MAIN ").is_ok());
    assert!(ctx.session(" main ").is_ok());
    assert!(ctx.connection_string_resolver().is_cached("main"));
}

#[test]
fn test_context_is_shareable_across_threads() {
    let config = TestConfig::new(&[scripted_entry("main")]);
    let ctx = Arc::new(config.scripted_context(&ScriptedDriver::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || ctx.resolve_provider("main").unwrap())
        })
        .collect();
    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for handle in &resolved[1..] {
        assert!(Arc::ptr_eq(&resolved[0], handle));
    }
}
