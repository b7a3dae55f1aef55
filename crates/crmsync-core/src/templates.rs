//! Metadata templates with `{{placeholder}}` substitution.
//!
//! Values are escaped for the template's format before substitution; an
//! unknown placeholder is an error rather than an empty string.

use crate::credentials::ConnectedAppCredentials;
use crate::environment::{with_scheme, B2cEnvironment};
use crate::error::{CrmSyncError, Result};
use crate::io;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub type TemplateValues = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Xml,
    Json,
    Text,
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("valid placeholder regex"))
}

fn escape(value: &str, kind: TemplateKind) -> String {
    match kind {
        TemplateKind::Xml => quick_xml::escape::escape(value).into_owned(),
        TemplateKind::Json => {
            // serde_json quotes the string; keep only the escaped contents.
            let quoted = serde_json::Value::String(value.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        TemplateKind::Text => value.to_string(),
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, values: &TemplateValues, kind: TemplateKind) -> Result<String> {
    let mut missing: Option<String> = None;
    let rendered = placeholder().replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match values.get(name) {
            Some(v) => escape(v, kind),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(CrmSyncError::TemplateMissingValue(name)),
        None => Ok(rendered.into_owned()),
    }
}


// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

struct TemplateFile {
    path: &'static str,
    kind: TemplateKind,
    body: &'static str,
}

const B2C_SERVICES: TemplateFile = TemplateFile {
    path: "services.xml",
    kind: TemplateKind::Xml,
    body: r#"<?xml version="1.0" encoding="UTF-8"?>
<services xmlns="http://www.demandware.com/xml/impex/services/2014-09-26">
    <service-credential service-credential-id="B2CCRMSync.auth">
        <url>{{sfLoginUrl}}/services/oauth2/token</url>
        <user-id>{{consumerKey}}</user-id>
        <password masked="false">{{consumerSecret}}</password>
    </service-credential>
    <service-credential service-credential-id="B2CCRMSync.rest">
        <url>{{sfInstanceUrl}}/services/data/v{{sfApiVersion}}</url>
        <user-id>{{consumerKey}}</user-id>
        <password masked="false">{{consumerSecret}}</password>
    </service-credential>
</services>
"#,
};

const B2C_SITE_PREFERENCES: TemplateFile = TemplateFile {
    path: "sites/{{siteId}}/preferences.xml",
    kind: TemplateKind::Xml,
    body: r#"<?xml version="1.0" encoding="UTF-8"?>
<preferences xmlns="http://www.demandware.com/xml/impex/preferences/2007-03-31">
    <custom-preferences>
        <all-instances>
            <preference preference-id="b2ccrm_syncCustomersEnabled">true</preference>
            <preference preference-id="b2ccrm_syncCustomersViaOCAPI">true</preference>
            <preference preference-id="b2ccrm_syncSiteId">{{siteId}}</preference>
        </all-instances>
    </custom-preferences>
</preferences>
"#,
};

const SF_TEMPLATES: &[TemplateFile] = &[
    TemplateFile {
        path: "namedCredentials/{{b2cInstanceName}}.namedCredential-meta.xml",
        kind: TemplateKind::Xml,
        body: r#"<?xml version="1.0" encoding="UTF-8"?>
<NamedCredential xmlns="http://soap.sforce.com/2006/04/metadata">
    <allowMergeFieldsInBody>true</allowMergeFieldsInBody>
    <allowMergeFieldsInHeader>true</allowMergeFieldsInHeader>
    <endpoint>{{b2cBaseUrl}}</endpoint>
    <generateAuthorizationHeader>false</generateAuthorizationHeader>
    <label>{{b2cInstanceName}}</label>
    <principalType>Anonymous</principalType>
    <protocol>NoAuthentication</protocol>
</NamedCredential>
"#,
    },
    TemplateFile {
        path: "namedCredentials/{{b2cInstanceName}}_AccountManager.namedCredential-meta.xml",
        kind: TemplateKind::Xml,
        body: r#"<?xml version="1.0" encoding="UTF-8"?>
<NamedCredential xmlns="http://soap.sforce.com/2006/04/metadata">
    <allowMergeFieldsInBody>true</allowMergeFieldsInBody>
    <allowMergeFieldsInHeader>true</allowMergeFieldsInHeader>
    <endpoint>{{accountManagerUrl}}</endpoint>
    <generateAuthorizationHeader>false</generateAuthorizationHeader>
    <label>{{b2cInstanceName}} Account Manager</label>
    <principalType>Anonymous</principalType>
    <protocol>NoAuthentication</protocol>
</NamedCredential>
"#,
    },
    TemplateFile {
        path: "connectedApps/{{b2cInstanceName}}_B2CCRMSync.connectedApp-meta.xml",
        kind: TemplateKind::Xml,
        body: r#"<?xml version="1.0" encoding="UTF-8"?>
<ConnectedApp xmlns="http://soap.sforce.com/2006/04/metadata">
    <contactEmail>{{contactEmail}}</contactEmail>
    <label>{{b2cInstanceName}} B2C CRM Sync</label>
    <oauthConfig>
        <callbackUrl>{{b2cBaseUrl}}/callback</callbackUrl>
        <consumerKey>{{consumerKey}}</consumerKey>
        <consumerSecret>{{consumerSecret}}</consumerSecret>
        <isAdminApproved>false</isAdminApproved>
        <scopes>Api</scopes>
        <scopes>RefreshToken</scopes>
    </oauthConfig>
</ConnectedApp>
"#,
    },
    TemplateFile {
        path: "records/{{b2cInstanceName}}.B2C_Instance__c.json",
        kind: TemplateKind::Json,
        body: r#"{
    "Name": "{{b2cInstanceName}}",
    "API_Url__c": "{{b2cBaseUrl}}",
    "B2C_Client_ID__c": "{{b2cClientId}}",
    "Is_Active__c": true
}
"#,
    },
];

fn write_template(
    out_dir: &Path,
    file: &TemplateFile,
    values: &TemplateValues,
) -> Result<PathBuf> {
    let relative = render(file.path, values, TemplateKind::Text)?;
    let body = render(file.body, values, file.kind)?;
    let path = out_dir.join(relative);
    io::atomic_write(&path, body.as_bytes())?;
    tracing::debug!(path = %path.display(), "template written");
    Ok(path)
}

/// Render the B2C data-archive metadata into a fresh `out_dir`: the service
/// credentials once, and the preferences file per site.
pub fn generate_b2c_metadata(
    out_dir: &Path,
    values: &TemplateValues,
    site_ids: &[String],
) -> Result<Vec<PathBuf>> {
    io::reset_dir(out_dir)?;
    let mut written = vec![write_template(out_dir, &B2C_SERVICES, values)?];
    for site_id in site_ids {
        let mut site_values = values.clone();
        site_values.insert("siteId".to_string(), site_id.clone());
        written.push(write_template(out_dir, &B2C_SITE_PREFERENCES, &site_values)?);
    }
    Ok(written)
}

/// Render the Salesforce metadata (named credentials, connected app,
/// instance record) into `source_dir`.
pub fn generate_sf_metadata(source_dir: &Path, values: &TemplateValues) -> Result<Vec<PathBuf>> {
    SF_TEMPLATES
        .iter()
        .map(|file| write_template(source_dir, file, values))
        .collect()
}

// ---------------------------------------------------------------------------
// Value sets
// ---------------------------------------------------------------------------

fn insert(values: &mut TemplateValues, key: &str, value: impl Into<String>) {
    values.insert(key.to_string(), value.into());
}

/// Values for the B2C data archive.
pub fn b2c_values(
    sf_login_url: &str,
    sf_instance_url: &str,
    sf_api_version: &str,
    credentials: &ConnectedAppCredentials,
) -> TemplateValues {
    let mut values = TemplateValues::new();
    insert(&mut values, "sfLoginUrl", with_scheme(sf_login_url));
    insert(&mut values, "sfInstanceUrl", with_scheme(sf_instance_url));
    insert(&mut values, "sfApiVersion", sf_api_version);
    insert(&mut values, "consumerKey", credentials.consumer_key.as_str());
    insert(&mut values, "consumerSecret", credentials.consumer_secret.as_str());
    values
}

/// Values for the Salesforce metadata.
pub fn sf_values(
    b2c: &B2cEnvironment,
    contact_email: &str,
    credentials: &ConnectedAppCredentials,
) -> Result<TemplateValues> {
    let mut values = TemplateValues::new();
    insert(&mut values, "b2cInstanceName", b2c.require_instance_name()?);
    insert(&mut values, "b2cBaseUrl", b2c.base_url());
    insert(&mut values, "b2cClientId", b2c.client_id.as_str());
    insert(
        &mut values,
        "accountManagerUrl",
        with_scheme(&b2c.account_manager_url),
    );
    insert(&mut values, "contactEmail", contact_email);
    insert(&mut values, "consumerKey", credentials.consumer_key.as_str());
    insert(&mut values, "consumerSecret", credentials.consumer_secret.as_str());
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::B2cConfig;
    use tempfile::TempDir;

    fn values(pairs: &[(&str, &str)]) -> TemplateValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_with_and_without_spaces() {
        let out = render(
            "{{a}}-{{ b }}",
            &values(&[("a", "1"), ("b", "2")]),
            TemplateKind::Text,
        )
        .unwrap();
        assert_eq!(out, "1-2");
    }

    #[test]
    fn xml_values_are_escaped() {
        let out = render(
            "<password>{{pw}}</password>",
            &values(&[("pw", "a<b&c\"")]),
            TemplateKind::Xml,
        )
        .unwrap();
        assert_eq!(out, "<password>a&lt;b&amp;c&quot;</password>");
    }

    #[test]
    fn json_values_are_escaped() {
        let out = render(
            r#"{"Name": "{{n}}"}"#,
            &values(&[("n", "quote\" and \\ slash")]),
            TemplateKind::Json,
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["Name"], "quote\" and \\ slash");
    }

    #[test]
    fn unknown_placeholder_fails() {
        let err = render("{{known}} {{missing}}", &values(&[("known", "x")]), TemplateKind::Text)
            .unwrap_err();
        assert!(matches!(err, CrmSyncError::TemplateMissingValue(n) if n == "missing"));
    }

    #[test]
    fn b2c_metadata_has_one_preferences_file_per_site() {
        let dir = TempDir::new().unwrap();
        let creds = ConnectedAppCredentials::generate();
        let vals = b2c_values("login.salesforce.com", "acme.my.salesforce.com", "58.0", &creds);
        let sites = vec!["RefArch".to_string(), "RefArchGlobal".to_string()];

        let written = generate_b2c_metadata(dir.path(), &vals, &sites).unwrap();
        assert_eq!(written.len(), 3);
        let services = std::fs::read_to_string(dir.path().join("services.xml")).unwrap();
        assert!(services.contains("https://login.salesforce.com/services/oauth2/token"));
        assert!(services.contains(&creds.consumer_key));
        let prefs =
            std::fs::read_to_string(dir.path().join("sites/RefArchGlobal/preferences.xml")).unwrap();
        assert!(prefs.contains(">RefArchGlobal<"));
    }

    #[test]
    fn sf_metadata_requires_instance_name() {
        let creds = ConnectedAppCredentials::generate();
        let env = B2cEnvironment::new(&B2cConfig::default(), "dev01.example.com", "cid", "sec");
        assert!(sf_values(&env, "a@b.c", &creds).is_err());
    }

    #[test]
    fn sf_metadata_renders_every_template() {
        let dir = TempDir::new().unwrap();
        let creds = ConnectedAppCredentials::generate();
        let mut env = B2cEnvironment::new(&B2cConfig::default(), "dev01.example.com", "cid", "sec");
        env.instance_name = Some("dev01".into());
        let vals = sf_values(&env, "ops@example.com", &creds).unwrap();

        let written = generate_sf_metadata(dir.path(), &vals).unwrap();
        assert_eq!(written.len(), 4);
        let named = std::fs::read_to_string(
            dir.path().join("namedCredentials/dev01.namedCredential-meta.xml"),
        )
        .unwrap();
        assert!(named.contains("<endpoint>https://dev01.example.com</endpoint>"));
        let record: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("records/dev01.B2C_Instance__c.json"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(record["B2C_Client_ID__c"], "cid");
    }
}
