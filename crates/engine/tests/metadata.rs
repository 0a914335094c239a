//! Metadata retrieval and interpretation, end to end

use serde_json::{Value, json};
use stackinit_engine::{
    Error, Hook, INIT_KEY, Metadata, RecordingExecutor, RetrieveOptions, Runtime,
};
use stackinit_http::{HttpClient, HttpRequest, HttpTransport, RawResponse};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Transport that replays canned responses and records every request
#[derive(Clone, Default)]
struct ScriptedTransport {
    responses: Rc<RefCell<VecDeque<RawResponse>>>,
    requests: Rc<RefCell<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    fn reply(&self, status: u16, reason: &str, body: &str) {
        self.responses.borrow_mut().push_back(RawResponse {
            version: "1.1".to_string(),
            status,
            reason: reason.to_string(),
            body: body.as_bytes().to_vec(),
            ..RawResponse::default()
        });
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> stackinit_http::Result<RawResponse> {
        self.requests.borrow_mut().push(request.clone());
        self.responses.borrow_mut().pop_front().ok_or_else(|| {
            stackinit_http::Error::Transport("no scripted response left".to_string())
        })
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    executor: RecordingExecutor,
    transport: ScriptedTransport,
    runtime: Runtime,
}

impl Fixture {
    fn new() -> Self {
        let executor = RecordingExecutor::new();
        let transport = ScriptedTransport::default();
        let runtime = Runtime::new(executor.clone(), HttpClient::new(transport.clone()));
        Self {
            dir: tempfile::tempdir().unwrap(),
            executor,
            transport,
            runtime,
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn options(&self) -> RetrieveOptions {
        RetrieveOptions {
            default_path: self.path("cfn-init-data"),
            last_path: self.path("last_metadata"),
            meta_str: None,
            metadata_server: self.path("cfn-metadata-server"),
            access_key: None,
            secret_key: None,
            credentials_file: Some(self.path("cfn-credentials")),
        }
    }

    fn retrieve(&self, metadata: &mut Metadata, options: &RetrieveOptions) -> stackinit_engine::Result<()> {
        metadata.retrieve(options, self.runtime.http())
    }
}

fn init_doc(config: Value) -> Value {
    json!({INIT_KEY: {"config": config}})
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_meta_str_without_any_other_source() {
    let fx = Fixture::new();
    let doc = init_doc(json!({"files": {}}));
    let options = fx.options().with_meta_str(doc.to_string());

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &options).unwrap();

    assert_eq!(metadata.raw(), Some(&doc));
    assert!(metadata.is_valid_metadata());
    assert_eq!(
        Value::Object(metadata.document().unwrap().clone()),
        doc[INIT_KEY]
    );
    assert!(fx.transport.requests().is_empty());
    assert_eq!(read_json(&fx.path("last_metadata")), doc);
}

#[test]
fn test_meta_str_accepts_parsed_value() {
    let fx = Fixture::new();
    let doc = init_doc(json!({}));
    let options = fx.options().with_meta_str(doc.clone());

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &options).unwrap();
    assert_eq!(metadata.raw(), Some(&doc));
}

#[test]
fn test_default_path_is_used_without_credentials() {
    let fx = Fixture::new();
    let doc = init_doc(json!({"commands": {}}));
    fs::write(fx.path("cfn-init-data"), doc.to_string()).unwrap();

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options()).unwrap();

    assert_eq!(metadata.raw(), Some(&doc));
    assert!(metadata.changed());
    assert_eq!(read_json(&fx.path("last_metadata")), doc);
}

#[test]
fn test_falls_back_to_last_known_good_unchanged() {
    let fx = Fixture::new();
    let cached = "{\"AWS::CloudFormation::Init\":{\"config\":{}}}";
    fs::write(fx.path("last_metadata"), cached).unwrap();
    fs::write(fx.path("cfn-init-data"), "").unwrap();

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options()).unwrap();

    assert_eq!(metadata.raw(), Some(&serde_json::from_str::<Value>(cached).unwrap()));
    assert!(!metadata.changed());
    assert_eq!(fs::read_to_string(fx.path("last_metadata")).unwrap(), cached);
}

#[test]
fn test_no_source_is_retrieval_error() {
    let fx = Fixture::new();
    let mut metadata = Metadata::new("teststack", None);

    let err = fx.retrieve(&mut metadata, &fx.options()).unwrap_err();

    assert!(matches!(err, Error::Retrieval(_)));
    assert!(!metadata.is_valid_metadata());
}

#[test]
fn test_remote_fetch_is_signed_and_cached_per_resource() {
    let fx = Fixture::new();
    let doc = init_doc(json!({"files": {}}));
    let envelope = json!({
        "DescribeStackResourceResponse": {
            "DescribeStackResourceResult": {
                "StackResourceDetail": {"Metadata": doc.to_string()}
            }
        }
    });
    fx.transport.reply(200, "OK", &envelope.to_string());
    fs::write(fx.path("cfn-metadata-server"), "http://heat.example.com:8000/\n").unwrap();
    fs::write(fx.path("cfn-credentials"), "AWSAccessKeyId=foo\nAWSSecretKey=bar\n").unwrap();

    let mut metadata = Metadata::new("teststack", Some("WebServer"));
    fx.retrieve(&mut metadata, &fx.options()).unwrap();

    assert_eq!(metadata.raw(), Some(&doc));
    let requests = fx.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    let url = &requests[0].url;
    assert!(url.starts_with("http://heat.example.com:8000/v1/?"), "{url}");
    for param in [
        "Action=DescribeStackResource",
        "StackName=teststack",
        "LogicalResourceId=WebServer",
        "ContentType=JSON",
        "AWSAccessKeyId=foo",
        "SignatureVersion=2",
        "&Signature=",
    ] {
        assert!(url.contains(param), "{param} missing from {url}");
    }

    assert_eq!(read_json(&fx.path("last_metadata_WebServer")), doc);
    assert!(!fx.path("last_metadata").exists());
}

#[test]
fn test_remote_metadata_object() {
    let fx = Fixture::new();
    let doc = init_doc(json!({}));
    let envelope = json!({
        "DescribeStackResourceResponse": {
            "DescribeStackResourceResult": {"StackResourceDetail": {"Metadata": doc}}
        }
    });
    fx.transport.reply(200, "OK", &envelope.to_string());
    let options = fx.options().with_keys("foo", "bar");

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &options).unwrap();

    assert_eq!(metadata.raw(), Some(&doc));
    assert!(fx.transport.requests()[0].url.starts_with("http://localhost:8000/v1/?"));
    assert!(!fx.transport.requests()[0].url.contains("LogicalResourceId"));
}

#[test]
fn test_remote_error_falls_back_to_default_path() {
    let fx = Fixture::new();
    fx.transport.reply(404, "Not Found", "");
    let doc = init_doc(json!({}));
    fs::write(fx.path("cfn-init-data"), doc.to_string()).unwrap();
    let options = fx.options().with_keys("foo", "bar");

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &options).unwrap();

    assert_eq!(fx.transport.requests().len(), 1);
    assert_eq!(metadata.raw(), Some(&doc));
}

#[test]
fn test_changed_tracks_the_cache() {
    let fx = Fixture::new();
    let doc = init_doc(json!({}));

    let mut first = Metadata::new("teststack", None);
    fx.retrieve(&mut first, &fx.options().with_meta_str(doc.clone()))
        .unwrap();
    assert!(first.changed());

    let mut second = Metadata::new("teststack", None);
    fx.retrieve(&mut second, &fx.options().with_meta_str(doc))
        .unwrap();
    assert!(!second.changed());

    let mut third = Metadata::new("teststack", None);
    fx.retrieve(&mut third, &fx.options().with_meta_str(init_doc(json!({"files": {}}))))
        .unwrap();
    assert!(third.changed());
}

#[test]
fn test_cfn_init_writes_file_content() {
    let fx = Fixture::new();
    let target = fx.path("tmp").join("foo");
    let doc = init_doc(json!({
        "files": {target.to_str().unwrap(): {"content": "bar"}}
    }));

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    metadata.cfn_init(&fx.runtime, None).unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "bar");
}

#[test]
fn test_cfn_init_file_from_source() {
    let fx = Fixture::new();
    fx.transport.reply(200, "OK", "downloaded");
    let target = fx.path("fetched");
    let doc = init_doc(json!({
        "files": {
            target.to_str().unwrap(): {"source": "http://files.example.com/x"},
            fx.path("skipped").to_str().unwrap(): {"mode": "000644"}
        }
    }));

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    metadata.cfn_init(&fx.runtime, None).unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "downloaded");
    assert!(!fx.path("skipped").exists());
    assert_eq!(fx.transport.requests()[0].url, "http://files.example.com/x");
}

#[test]
fn test_cfn_init_runs_commands_in_document_order() {
    let fx = Fixture::new();
    let doc = init_doc(json!({
        "commands": {
            "z_first": {"command": "echo first"},
            "a_second": {"command": ["echo", "second"], "env": {"A": "1"}}
        }
    }));

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    metadata.cfn_init(&fx.runtime, None).unwrap();

    assert_eq!(fx.executor.commands(), vec!["echo first", "echo second"]);
    assert_eq!(fx.executor.invocations()[1].env["A"], "1");
}

#[test]
fn test_cfn_init_failing_command_aborts() {
    let fx = Fixture::new();
    let doc = init_doc(json!({
        "commands": {
            "01_fails": {"command": "false"},
            "02_never": {"command": "echo never"}
        }
    }));
    fx.executor.push_status(1);

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    let err = metadata.cfn_init(&fx.runtime, None).unwrap_err();

    match err {
        Error::CommandFailure { label, .. } => assert_eq!(label, "01_fails"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.executor.commands(), vec!["false"]);
}

#[test]
fn test_cfn_init_ignore_errors_and_test_precondition() {
    let fx = Fixture::new();
    let cwd = fx.dir.path().to_str().unwrap().to_string();
    let doc = init_doc(json!({
        "commands": {
            "01_ignored": {"command": "false", "ignoreErrors": "true"},
            "02_guarded": {"command": "echo guarded", "test": "test -e /nonexistent"},
            "03_runs": {"command": "echo runs", "cwd": cwd}
        }
    }));
    fx.executor.push_status(1); // 01_ignored
    fx.executor.push_status(1); // 02_guarded test

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    metadata.cfn_init(&fx.runtime, None).unwrap();

    assert_eq!(
        fx.executor.commands(),
        vec!["false", "test -e /nonexistent", "echo runs"]
    );
    assert_eq!(fx.executor.invocations()[2].cwd.as_deref(), Some(fx.dir.path()));
}

#[test]
fn test_cfn_init_missing_cwd_is_failure() {
    let fx = Fixture::new();
    let doc = init_doc(json!({
        "commands": {"01": {"command": "ls", "cwd": "/nonexistent/stackinit"}}
    }));

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    let err = metadata.cfn_init(&fx.runtime, None).unwrap_err();

    assert!(matches!(err, Error::CommandFailure { .. }));
    assert!(fx.executor.commands().is_empty());
}

#[test]
fn test_cfn_init_section_order() {
    let fx = Fixture::new();
    let doc = init_doc(json!({
        "services": {"systemd": {"httpd": {"enabled": "true"}}},
        "commands": {"01": {"command": "echo command"}},
        "packages": {"python": {"boto": []}, "yum": {"httpd": []}}
    }));

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    metadata.cfn_init(&fx.runtime, None).unwrap();

    assert_eq!(
        fx.executor.commands(),
        vec![
            "yum -y install httpd",
            "pip install boto",
            "echo command",
            "/bin/systemctl enable httpd.service",
        ]
    );
}

#[test]
fn test_cfn_init_config_sets() {
    let fx = Fixture::new();
    let doc = json!({INIT_KEY: {
        "configSets": {
            "default": [{"ConfigSet": "setup"}, "deploy"],
            "setup": ["install"]
        },
        "install": {"commands": {"01": {"command": "echo install"}}},
        "deploy": {"commands": {"01": {"command": "echo deploy"}}}
    }});

    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc))
        .unwrap();
    metadata.cfn_init(&fx.runtime, None).unwrap();

    assert_eq!(fx.executor.commands(), vec!["echo install", "echo deploy"]);
}

#[test]
fn test_cfn_init_rejects_invalid_document() {
    let fx = Fixture::new();
    let mut metadata = Metadata::new("teststack", None);
    fx.retrieve(
        &mut metadata,
        &fx.options().with_meta_str(json!({"AWS::CloudFormation::Other": {}})),
    )
    .unwrap();

    let err = metadata.cfn_init(&fx.runtime, None).unwrap_err();
    assert!(matches!(err, Error::Retrieval(_)));
}

#[test]
fn test_cfn_hup_fires_post_update_on_change() {
    let fx = Fixture::new();
    let doc = init_doc(json!({
        "services": {"systemd": {"httpd": {"ensureRunning": "true"}}}
    }));
    let hooks = vec![
        Hook::new("update", "post.update", "Resources.WebServer.Metadata", "/bin/on-update"),
        Hook::new("other", "post.update", "Resources.Database.Metadata", "/bin/never"),
    ];

    let mut metadata = Metadata::new("teststack", Some("WebServer"));
    fx.retrieve(&mut metadata, &fx.options().with_meta_str(doc.clone()))
        .unwrap();
    fx.executor.push_status(0); // httpd running
    metadata.cfn_hup(&fx.runtime, &hooks);

    assert_eq!(
        fx.executor.commands(),
        vec!["/bin/systemctl status httpd.service", "/bin/on-update"]
    );

    // unchanged metadata only re-checks the service
    let mut again = Metadata::new("teststack", Some("WebServer"));
    fx.retrieve(&mut again, &fx.options().with_meta_str(doc))
        .unwrap();
    fx.executor.push_status(0);
    again.cfn_hup(&fx.runtime, &hooks);
    assert_eq!(fx.executor.commands().len(), 3);
}
