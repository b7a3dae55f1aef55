#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Read;
use tempfile::TempDir;

const SETTINGS: &[&str] = &[
    "B2C_HOSTNAME",
    "B2C_CLIENTID",
    "B2C_CLIENTSECRET",
    "B2C_SITEIDS",
    "B2C_CODEVERSION",
    "B2C_INSTANCENAME",
    "B2C_ACCOUNTMANAGER_URL",
    "SF_HOSTNAME",
    "SF_LOGINURL",
    "SF_USERNAME",
    "SF_PASSWORD",
    "SF_SECURITYTOKEN",
    "SF_TARGETORG",
    "CRM_SYNC_OPERATION_MODE",
];

fn crm_sync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("crm-sync").unwrap();
    for key in SETTINGS {
        cmd.env_remove(key);
    }
    cmd.current_dir(dir.path()).env("CRM_SYNC_ROOT", dir.path());
    cmd
}

fn read_credentials(dir: &TempDir) -> serde_json::Value {
    let path = dir.path().join("build/sf/connectedAppCredentials.json");
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Argument handling
// ---------------------------------------------------------------------------

#[test]
fn help_lists_both_platforms() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("b2c"))
        .stdout(predicate::str::contains("sf"));
}

#[test]
fn b2c_commands_require_connection_settings() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args(["b2c", "sites-verify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--b2c-hostname"));
}

#[test]
fn sites_verify_without_site_ids_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args(["b2c", "sites-verify"])
        .env("B2C_HOSTNAME", "localhost:1")
        .env("B2C_CLIENTID", "cid")
        .env("B2C_CLIENTSECRET", "secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("B2C_SITEIDS"));
}

#[test]
fn data_deploy_with_missing_archive_names_the_file() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args(["b2c", "data-deploy", "--archive", "nope.zip"])
        .env("B2C_HOSTNAME", "localhost:1")
        .env("B2C_CLIENTID", "cid")
        .env("B2C_CLIENTSECRET", "secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.zip"));
}

#[test]
fn unknown_operation_mode_is_rejected() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args(["--operation-mode", "yaml", "sf", "build"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// crm-sync sf build
// ---------------------------------------------------------------------------

fn sf_build(dir: &TempDir) -> assert_cmd::assert::Assert {
    crm_sync(dir)
        .args(["sf", "build"])
        .env("B2C_HOSTNAME", "dev01-realm-acme.demandware.net")
        .env("B2C_CLIENTID", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        .env("B2C_INSTANCENAME", "dev01")
        .assert()
}

#[test]
fn sf_build_writes_metadata_and_credentials() {
    let dir = TempDir::new().unwrap();
    sf_build(&dir).success();

    let source = dir.path().join("build/sf/force-app/main/default");
    let named = source.join("namedCredentials/dev01.namedCredential-meta.xml");
    assert!(named.is_file());
    assert!(source
        .join("connectedApps/dev01_B2CCRMSync.connectedApp-meta.xml")
        .is_file());
    assert!(source.join("records/dev01.B2C_Instance__c.json").is_file());

    let xml = std::fs::read_to_string(named).unwrap();
    assert!(xml.contains("https://dev01-realm-acme.demandware.net"));

    let creds = read_credentials(&dir);
    assert!(creds["consumerKey"].as_str().unwrap().starts_with("3MVG"));
}

#[test]
fn sf_build_reuses_existing_credentials() {
    let dir = TempDir::new().unwrap();
    sf_build(&dir).success();
    let first = read_credentials(&dir);
    sf_build(&dir).success();
    let second = read_credentials(&dir);
    assert_eq!(first["consumerKey"], second["consumerKey"]);
    assert_eq!(first["consumerSecret"], second["consumerSecret"]);
}

#[test]
fn sf_build_json_mode_reports_files() {
    let dir = TempDir::new().unwrap();
    let output = crm_sync(&dir)
        .args(["--operation-mode", "json", "sf", "build"])
        .env("B2C_HOSTNAME", "dev01.example.com")
        .env("B2C_CLIENTID", "cid")
        .env("B2C_INSTANCENAME", "dev01")
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["credentials_created"], true);
    assert_eq!(report["files"].as_array().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// crm-sync b2c build --no-deploy
// ---------------------------------------------------------------------------

#[test]
fn b2c_build_without_deploy_writes_site_archive() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args(["b2c", "build", "--no-deploy"])
        .env("B2C_HOSTNAME", "dev01.example.com")
        .env("B2C_CLIENTID", "cid")
        .env("B2C_CLIENTSECRET", "secret")
        .env("B2C_SITEIDS", "RefArch, RefArchGlobal")
        .env("SF_HOSTNAME", "acme.my.salesforce.com")
        .assert()
        .success()
        .stdout(predicate::str::contains("b2c-crm-sync-data.zip"));

    let zip_path = dir.path().join("build/b2c/data/b2c-crm-sync-data.zip");
    let mut archive = zip::ZipArchive::new(std::fs::File::open(zip_path).unwrap()).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert!(names.contains(&"b2c-crm-sync-data/services.xml".to_string()));
    assert!(names.contains(&"b2c-crm-sync-data/sites/RefArch/preferences.xml".to_string()));
    assert!(names.contains(&"b2c-crm-sync-data/sites/RefArchGlobal/preferences.xml".to_string()));

    let mut services = String::new();
    archive
        .by_name("b2c-crm-sync-data/services.xml")
        .unwrap()
        .read_to_string(&mut services)
        .unwrap();
    assert!(services.contains("https://acme.my.salesforce.com"));

    // The archive embeds the same connected app the Salesforce side is built with.
    let creds = read_credentials(&dir);
    assert!(services.contains(creds["consumerKey"].as_str().unwrap()));
}

#[test]
fn b2c_build_requires_salesforce_hostname() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args(["b2c", "build", "--no-deploy"])
        .env("B2C_HOSTNAME", "dev01.example.com")
        .env("B2C_CLIENTID", "cid")
        .env("B2C_CLIENTSECRET", "secret")
        .env("B2C_SITEIDS", "RefArch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--sf-hostname"));
}

#[test]
fn b2c_build_accepts_both_hostname_flags() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args([
            "b2c",
            "build",
            "--no-deploy",
            "--b2c-hostname",
            "dev01.example.com",
            "--b2c-client-id",
            "cid",
            "--b2c-client-secret",
            "secret",
            "--b2c-site-ids",
            "RefArch",
            "--sf-hostname",
            "acme.my.salesforce.com",
        ])
        .assert()
        .success();
    assert!(dir
        .path()
        .join("build/b2c/data/b2c-crm-sync-data.zip")
        .is_file());
}

// ---------------------------------------------------------------------------
// crm-sync sf instance-setup
// ---------------------------------------------------------------------------

#[test]
fn sf_instance_setup_parses_and_needs_credentials_for_password_login() {
    let dir = TempDir::new().unwrap();
    crm_sync(&dir)
        .args([
            "sf",
            "instance-setup",
            "--sf-username",
            "admin@acme.com",
            "--sf-password",
            "hunter2",
            "--sf-hostname",
            "acme.my.salesforce.com",
            "--b2c-hostname",
            "dev01.example.com",
            "--b2c-client-id",
            "cid",
            "--b2c-instance-name",
            "dev01",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no connected app credentials"));
}
