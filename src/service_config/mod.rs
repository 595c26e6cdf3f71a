//! # Service Configuration Model
//!
//! Typed view of the service configuration document served by the service
//! management endpoint. The document arrives as protobuf JSON; all
//! cross-references between its sections are by selector string
//! `<api-name>.<method-name>`.
//!
//! Protobuf `Any` payloads inside the document are resolved against a known
//! type whitelist before deserialization; anything else is a fatal parse
//! error.

pub mod fetcher;
pub mod jwks;

use serde::{Deserialize, Serialize};

use crate::xds::filters::Base64Bytes;
use crate::{Error, Result};

/// Type URL of a service management config file payload
pub const CONFIG_FILE_TYPE_URL: &str =
    "type.googleapis.com/google.api.servicemanagement.v1.ConfigFile";

/// Type URL of an HTTP rule payload
pub const HTTP_RULE_TYPE_URL: &str = "type.googleapis.com/google.api.HttpRule";

/// Service configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub name: String,
    pub id: Option<String>,
    pub title: Option<String>,
    pub apis: Vec<Api>,
    pub source_info: Option<SourceInfo>,
    pub authentication: Option<Authentication>,
    pub usage: Option<Usage>,
    pub http: Option<Http>,
    pub backend: Option<Backend>,
    pub control: Option<Control>,
}

/// API descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Api {
    pub name: String,
    pub methods: Vec<Method>,
    pub version: Option<String>,
    pub source_context: Option<SourceContext>,
}

/// API method descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Method {
    pub name: String,
    pub request_type_url: Option<String>,
    pub response_type_url: Option<String>,
}

/// Origin of an API definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceContext {
    pub file_name: String,
}

/// Source files the config was compiled from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceInfo {
    pub source_files: Vec<SourceFile>,
}

/// `Any`-typed source file entry, resolved against the type whitelist
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum SourceFile {
    #[serde(rename = "type.googleapis.com/google.api.servicemanagement.v1.ConfigFile")]
    ConfigFile(ConfigFile),
    #[serde(rename = "type.googleapis.com/google.api.HttpRule")]
    HttpRule(HttpRule),
}

/// Service management config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub file_path: String,
    pub file_contents: Base64Bytes,
    pub file_type: ConfigFileType,
}

/// Kind of a service management config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigFileType {
    #[default]
    ConfigFileTypeUnspecified,
    ServiceConfigYaml,
    OpenApiJson,
    OpenApiYaml,
    FileDescriptorSetProto,
    ProtoFile,
}

/// Authentication section: providers and per-method rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Authentication {
    pub providers: Vec<AuthProvider>,
    pub rules: Vec<AuthenticationRule>,
}

/// JWT provider declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthProvider {
    pub id: String,
    pub issuer: String,
    pub jwks_uri: String,
    /// Comma-separated audience list; empty means provider defaults
    pub audiences: String,
}

/// Per-method authentication rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthenticationRule {
    pub selector: String,
    pub requirements: Vec<AuthRequirement>,
    pub allow_without_credential: bool,
}

/// Single provider requirement inside an authentication rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRequirement {
    pub provider_id: String,
    /// Comma-separated audience list; empty inherits the provider audiences
    pub audiences: String,
}

/// Usage section: per-method API key policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    pub rules: Vec<UsageRule>,
}

/// Per-method usage rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageRule {
    pub selector: String,
    pub allow_unregistered_calls: bool,
}

/// HTTP section: per-method bindings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Http {
    pub rules: Vec<HttpRule>,
}

/// Per-method HTTP binding. The URI template string is forwarded verbatim;
/// `{var}` segments are interpreted by the proxy at request time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRule {
    pub selector: String,
    pub get: Option<String>,
    pub put: Option<String>,
    pub post: Option<String>,
    pub delete: Option<String>,
    pub patch: Option<String>,
    pub body: Option<String>,
}

impl HttpRule {
    /// The declared verb and URI template, if any
    pub fn pattern(&self) -> Option<HttpPattern> {
        if let Some(template) = &self.get {
            Some(HttpPattern::Get(template.clone()))
        } else if let Some(template) = &self.put {
            Some(HttpPattern::Put(template.clone()))
        } else if let Some(template) = &self.post {
            Some(HttpPattern::Post(template.clone()))
        } else if let Some(template) = &self.delete {
            Some(HttpPattern::Delete(template.clone()))
        } else {
            self.patch.as_ref().map(|template| HttpPattern::Patch(template.clone()))
        }
    }
}

/// HTTP verb and URI template of a binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpPattern {
    Get(String),
    Put(String),
    Post(String),
    Delete(String),
    Patch(String),
}

impl HttpPattern {
    /// HTTP method name of this binding
    pub fn http_method(&self) -> &'static str {
        match self {
            HttpPattern::Get(_) => "GET",
            HttpPattern::Put(_) => "PUT",
            HttpPattern::Post(_) => "POST",
            HttpPattern::Delete(_) => "DELETE",
            HttpPattern::Patch(_) => "PATCH",
        }
    }

    /// URI template of this binding, verbatim
    pub fn uri_template(&self) -> &str {
        match self {
            HttpPattern::Get(template)
            | HttpPattern::Put(template)
            | HttpPattern::Post(template)
            | HttpPattern::Delete(template)
            | HttpPattern::Patch(template) => template,
        }
    }
}

/// Backend section: per-method upstream overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Backend {
    pub rules: Vec<BackendRule>,
}

/// Per-method backend rule. The path translation mode is carried through to
/// the data plane untouched; this core never rewrites paths itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendRule {
    pub selector: String,
    pub address: String,
    pub path_translation: PathTranslation,
    pub jwt_audience: Option<String>,
}

/// How the proxy derives the upstream path from the request path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathTranslation {
    #[default]
    PathTranslationUnspecified,
    ConstantAddress,
    AppendPathToAddress,
}

/// Control section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Control {
    pub environment: String,
}

/// Protocol spoken by the upstream backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendProtocol {
    Grpc,
    Http,
}

impl BackendProtocol {
    /// Classify the backend protocol from the API's source file name
    pub fn classify(api: &Api) -> Result<Self> {
        let file_name =
            api.source_context.as_ref().map(|ctx| ctx.file_name.as_str()).unwrap_or_default();

        if file_name.ends_with(".proto") {
            Ok(BackendProtocol::Grpc)
        } else if file_name.ends_with(".yaml") {
            Ok(BackendProtocol::Http)
        } else {
            Err(Error::UnknownBackendProtocol(file_name.to_string()))
        }
    }
}

impl Service {
    /// Dotted selector for a method of an API
    pub fn selector(api: &Api, method: &Method) -> String {
        format!("{}.{}", api.name, method.name)
    }

    /// The API the single upstream cluster is named after
    pub fn endpoint_api(&self) -> Result<&Api> {
        self.apis.first().ok_or(Error::EmptyApis)
    }
}

/// Parse a service config document from protobuf JSON.
///
/// Every embedded `Any` payload is resolved against the known type whitelist
/// first; an unknown type URL fails the whole parse. Unknown plain fields are
/// tolerated.
pub fn parse_service(body: &str) -> Result<Service> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::config_fetch(format!("fail to unmarshal service config: {}", e)))?;

    check_any_types(&value)?;

    serde_json::from_value(value)
        .map_err(|e| Error::config_fetch(format!("fail to unmarshal service config: {}", e)))
}

/// Walk the document and reject `Any` payloads outside the whitelist
fn check_any_types(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(type_url)) = map.get("@type") {
                if type_url != CONFIG_FILE_TYPE_URL && type_url != HTTP_RULE_TYPE_URL {
                    return Err(Error::UnknownAnyType(type_url.clone()));
                }
            }
            for child in map.values() {
                check_any_types(child)?;
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                check_any_types(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> &'static str {
        r#"{
            "name": "test-echo.endpoints.cloudesf-testing.cloud.goog",
            "id": "test-config-id",
            "apis": [{
                "name": "endpoints.examples.bookstore.Bookstore",
                "methods": [
                    {"name": "ListShelves"},
                    {"name": "CreateShelf"}
                ],
                "sourceContext": {"fileName": "bookstore.proto"}
            }],
            "sourceInfo": {
                "sourceFiles": [{
                    "@type": "type.googleapis.com/google.api.servicemanagement.v1.ConfigFile",
                    "filePath": "api_descriptor.pb",
                    "fileContents": "Cgd0ZXN0LnBi",
                    "fileType": "FILE_DESCRIPTOR_SET_PROTO"
                }]
            },
            "http": {
                "rules": [{
                    "selector": "endpoints.examples.bookstore.Bookstore.ListShelves",
                    "get": "/v1/shelves"
                }]
            },
            "usage": {
                "rules": [{
                    "selector": "endpoints.examples.bookstore.Bookstore.ListShelves",
                    "allowUnregisteredCalls": true
                }]
            },
            "backend": {
                "rules": [{
                    "selector": "endpoints.examples.bookstore.Bookstore.ListShelves",
                    "address": "https://backend/dynamicrouting/listshelves",
                    "pathTranslation": "CONSTANT_ADDRESS",
                    "jwtAudience": "https://localhost/bearertoken/constant"
                }]
            },
            "control": {"environment": "servicecontrol.googleapis.com"},
            "unknownTopLevelField": {"ignored": true}
        }"#
    }

    #[test]
    fn test_parse_full_document() {
        let service = parse_service(sample_document()).expect("parse");
        assert_eq!(service.name, "test-echo.endpoints.cloudesf-testing.cloud.goog");
        assert_eq!(service.apis.len(), 1);
        assert_eq!(service.apis[0].methods.len(), 2);

        let source_info = service.source_info.as_ref().expect("source info");
        match &source_info.source_files[0] {
            SourceFile::ConfigFile(file) => {
                assert_eq!(file.file_type, ConfigFileType::FileDescriptorSetProto);
                assert_eq!(file.file_contents.0, b"\x0a\x07test.pb");
            }
            other => panic!("unexpected source file: {:?}", other),
        }

        let http = service.http.as_ref().expect("http");
        let pattern = http.rules[0].pattern().expect("pattern");
        assert_eq!(pattern.http_method(), "GET");
        assert_eq!(pattern.uri_template(), "/v1/shelves");

        let backend = service.backend.as_ref().expect("backend");
        assert_eq!(backend.rules[0].path_translation, PathTranslation::ConstantAddress);
        assert_eq!(
            backend.rules[0].jwt_audience.as_deref(),
            Some("https://localhost/bearertoken/constant")
        );
    }

    #[test]
    fn test_unknown_any_type_is_fatal() {
        let body = r#"{
            "name": "test",
            "sourceInfo": {
                "sourceFiles": [{
                    "@type": "type.googleapis.com/google.api.Billing",
                    "rules": []
                }]
            }
        }"#;

        let err = parse_service(body).unwrap_err();
        assert!(matches!(err, Error::UnknownAnyType(url) if url.contains("google.api.Billing")));
    }

    #[test]
    fn test_http_rule_verbs() {
        let body = r#"{
            "name": "test",
            "http": {"rules": [
                {"selector": "a.Get", "get": "/get"},
                {"selector": "a.Put", "put": "/put"},
                {"selector": "a.Post", "post": "/post"},
                {"selector": "a.Delete", "delete": "/delete"},
                {"selector": "a.Patch", "patch": "/patch"}
            ]}
        }"#;

        let service = parse_service(body).expect("parse");
        let rules = &service.http.as_ref().unwrap().rules;
        let verbs: Vec<&str> =
            rules.iter().map(|r| r.pattern().unwrap().http_method()).collect();
        assert_eq!(verbs, vec!["GET", "PUT", "POST", "DELETE", "PATCH"]);
    }

    #[test]
    fn test_uri_template_preserved_verbatim() {
        let body = r#"{
            "name": "test",
            "http": {"rules": [
                {"selector": "a.Snake", "get": "/shelves/{s_h_e_l_f.i_d}/books/id/{b_o_o_k.id}"}
            ]}
        }"#;

        let service = parse_service(body).expect("parse");
        let pattern = service.http.as_ref().unwrap().rules[0].pattern().unwrap();
        assert_eq!(pattern.uri_template(), "/shelves/{s_h_e_l_f.i_d}/books/id/{b_o_o_k.id}");
    }

    #[test]
    fn test_classify_backend_protocol() {
        let mut api = Api {
            name: "endpoints.examples.bookstore.Bookstore".to_string(),
            source_context: Some(SourceContext { file_name: "bookstore.proto".to_string() }),
            ..Default::default()
        };
        assert_eq!(BackendProtocol::classify(&api).unwrap(), BackendProtocol::Grpc);

        api.source_context = Some(SourceContext { file_name: "openapi.yaml".to_string() });
        assert_eq!(BackendProtocol::classify(&api).unwrap(), BackendProtocol::Http);

        api.source_context = Some(SourceContext { file_name: "swagger.json".to_string() });
        let err = BackendProtocol::classify(&api).unwrap_err();
        assert!(matches!(err, Error::UnknownBackendProtocol(_)));

        api.source_context = None;
        assert!(BackendProtocol::classify(&api).is_err());
    }

    #[test]
    fn test_endpoint_api_requires_one_api() {
        let service = Service::default();
        assert!(matches!(service.endpoint_api().unwrap_err(), Error::EmptyApis));
    }

    #[test]
    fn test_selector_format() {
        let api = Api { name: "pkg.Api".to_string(), ..Default::default() };
        let method = Method { name: "DoThing".to_string(), ..Default::default() };
        assert_eq!(Service::selector(&api, &method), "pkg.Api.DoThing");
    }
}
