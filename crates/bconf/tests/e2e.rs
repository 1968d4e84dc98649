//! End-to-end tests over the public entry point.

use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use bconf::{Document, DuplicateKeys, Loader, Object, Options, ParseError, Value};

fn parse(source: &str) -> Document {
    bconf::parse_with(source, isolated_options()).expect("parse failed")
}

fn try_parse(source: &str) -> Result<Document, ParseError> {
    bconf::parse_with(source, isolated_options())
}

/// Options with no process environment and no filesystem access, so tests
/// stay hermetic.
fn isolated_options() -> Options {
    Options {
        env: Some(Default::default()),
        loader: Some(failing_loader()),
        ..Options::default()
    }
}

fn failing_loader() -> Loader {
    Rc::new(|_root: &std::path::Path, path: &str| {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file '{path}'"),
        ))
    })
}

fn memory_loader(files: &[(&str, &str)]) -> Loader {
    let map: std::collections::HashMap<String, String> = files
        .iter()
        .map(|(path, text)| (path.to_string(), text.to_string()))
        .collect();
    Rc::new(move |_root: &std::path::Path, path: &str| {
        map.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file '{path}'"))
        })
    })
}

fn root(doc: &Document) -> &Object {
    doc.data.as_object().expect("root is an object")
}

fn s(text: &str) -> Value {
    Value::String(text.to_string())
}

// ------------------------------------------------------------------
// The specified end-to-end scenarios
// ------------------------------------------------------------------

#[test]
fn scenario_ref_copies_earlier_value() {
    let doc = parse("foo = 1\nbar = ref(foo)");
    assert_eq!(root(&doc).get("foo"), Some(&Value::Int(1)));
    assert_eq!(root(&doc).get("bar"), Some(&Value::Int(1)));
}

#[test]
fn scenario_variable_in_object() {
    let doc = parse("$p = 8080\nserver { host = \"0.0.0.0\"\nport = $p }");
    let server = root(&doc).get("server").unwrap().as_object().unwrap();
    assert_eq!(server.get("host"), Some(&s("0.0.0.0")));
    assert_eq!(server.get("port"), Some(&Value::Int(8080)));
    assert_eq!(root(&doc).len(), 1);
}

#[test]
fn scenario_index_assignment_pads() {
    let doc = parse("arr[2] = \"X\"");
    assert_eq!(
        root(&doc).get("arr"),
        Some(&Value::Array(vec![Value::Null, Value::Null, s("X")]))
    );
}

#[test]
fn scenario_append_builds_array() {
    let doc = parse("list << \"a\"\nlist << \"b\"");
    assert_eq!(
        root(&doc).get("list"),
        Some(&Value::Array(vec![s("a"), s("b")]))
    );
}

#[test]
fn scenario_statements_collect() {
    let doc = parse("allow from localhost\nallow from \"10.0.0.0/8\"");
    assert_eq!(
        root(&doc).get("allow"),
        Some(&Value::Array(vec![
            Value::Array(vec![s("from"), s("localhost")]),
            Value::Array(vec![s("from"), s("10.0.0.0/8")]),
        ]))
    );
}

#[test]
fn scenario_string_interpolation() {
    let doc = parse("$v = \"world\"\ns = \"hello ${$v}!\"");
    assert_eq!(root(&doc).get("s"), Some(&s("hello world!")));
}

#[test]
fn scenario_shared_array_element_object() {
    let doc = parse("a.b[0].c = 1\na.b[0].d = 2");
    let a = root(&doc).get("a").unwrap().as_object().unwrap();
    let b = a.get("b").unwrap().as_array().unwrap();
    let first = b[0].as_object().unwrap();
    assert_eq!(first.get("c"), Some(&Value::Int(1)));
    assert_eq!(first.get("d"), Some(&Value::Int(2)));
}

#[test]
fn scenario_extends_overridden_by_later_assignment() {
    let options = Options {
        loader: Some(memory_loader(&[("base", "k = 1\nother = 3")])),
        env: Some(Default::default()),
        ..Options::default()
    };
    let doc = bconf::parse_with("extends \"base\"\nk = 2", options).unwrap();
    assert_eq!(root(&doc).get("k"), Some(&Value::Int(2)));
    assert_eq!(root(&doc).get("other"), Some(&Value::Int(3)));
}

// ------------------------------------------------------------------
// The specified error cases
// ------------------------------------------------------------------

#[test]
fn error_invalid_key() {
    let err = try_parse("key = invalid+").unwrap_err();
    assert!(err.message.contains("invalid key"), "{err}");
    assert_eq!(err.row, 1);
}

#[test]
fn error_ref_unknown_key() {
    let err = try_parse("val = ref(undefined)").unwrap_err();
    assert!(
        err.message.contains("no value exists at key 'undefined'"),
        "{err}"
    );
}

#[test]
fn error_raw_newline_in_string() {
    let err = try_parse("\"hello\nworld\"").unwrap_err();
    assert_eq!((err.row, err.column), (1, 7));
}

#[test]
fn error_consecutive_underscores() {
    let err = try_parse("num = 1__000").unwrap_err();
    assert!(err.message.contains("consecutive underscores"), "{err}");
}

#[test]
fn error_variable_out_of_scope() {
    let err = try_parse("obj { $x = 1 }\nkey = $x").unwrap_err();
    assert!(err.message.contains("could not resolve variable"), "{err}");
}

// ------------------------------------------------------------------
// Options surface
// ------------------------------------------------------------------

#[test]
fn option_env_map() {
    let mut env = std::collections::HashMap::new();
    env.insert("REGION".to_string(), "eu-1".to_string());
    let options = Options {
        env: Some(env),
        ..isolated_options()
    };
    let doc = bconf::parse_with("region = env(REGION)", options).unwrap();
    assert_eq!(root(&doc).get("region"), Some(&s("eu-1")));
}

#[test]
fn option_duplicate_keys_disallow() {
    let options = Options {
        duplicate_keys: DuplicateKeys::Disallow,
        ..isolated_options()
    };
    let err = bconf::parse_with("a = 1\na = 2", options).unwrap_err();
    assert!(err.message.contains("duplicate key"), "{err}");
}

#[test]
fn option_unwrap_false() {
    let options = Options {
        unwrap: false,
        ..isolated_options()
    };
    let doc = bconf::parse_with("x = custom(1)", options).unwrap();
    assert!(matches!(root(&doc).get("x"), Some(Value::Tag(_))));
}

#[test]
fn option_file_is_informational() {
    let options = Options {
        file: Some("main.bconf".to_string()),
        ..isolated_options()
    };
    assert!(bconf::parse_with("a = 1", options).is_ok());
}

// ------------------------------------------------------------------
// Composition over the in-memory loader
// ------------------------------------------------------------------

#[test]
fn import_chain() {
    let options = Options {
        loader: Some(memory_loader(&[
            (
                "shared/ports",
                "$http = 80\n$https = 443\nexport vars { $http, $https as $tls }",
            ),
        ])),
        env: Some(Default::default()),
        ..Options::default()
    };
    let doc = bconf::parse_with(
        "import from \"shared/ports\" { $http, $tls }\na = $http\nb = $tls",
        options,
    )
    .unwrap();
    assert_eq!(root(&doc).get("a"), Some(&Value::Int(80)));
    assert_eq!(root(&doc).get("b"), Some(&Value::Int(443)));
}

#[test]
fn extends_chain_is_order_preserving() {
    let options = Options {
        loader: Some(memory_loader(&[
            ("a", "k = 1\nfrom-a = true"),
            ("b", "k = 2\nfrom-b = true"),
        ])),
        env: Some(Default::default()),
        ..Options::default()
    };
    let doc = bconf::parse_with("extends \"a\"\nextends \"b\"", options).unwrap();
    assert_eq!(root(&doc).get("k"), Some(&Value::Int(1)));
    assert_eq!(root(&doc).get("from-a"), Some(&Value::Bool(true)));
    assert_eq!(root(&doc).get("from-b"), Some(&Value::Bool(true)));
}

#[test]
fn extends_sees_exported_variables_only_through_import() {
    // Variables from the extended file do not leak into this scope.
    let options = Options {
        loader: Some(memory_loader(&[("base", "$secret = 1\nk = $secret")])),
        env: Some(Default::default()),
        ..Options::default()
    };
    let err = bconf::parse_with("extends \"base\"\nx = $secret", options).unwrap_err();
    assert!(err.message.contains("could not resolve variable"), "{err}");
}

// ------------------------------------------------------------------
// The default filesystem loader
// ------------------------------------------------------------------

struct TempTree {
    dir: PathBuf,
}

impl TempTree {
    fn new(name: &str, files: &[(&str, &str)]) -> Self {
        let dir = std::env::temp_dir().join(format!("bconf-e2e-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        for (name, text) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create parent dir");
            }
            std::fs::write(path, text).expect("write temp file");
        }
        Self { dir }
    }
}

impl Drop for TempTree {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn fs_loader_reads_relative_to_root_dir() {
    let tree = TempTree::new("reads", &[("base.bconf", "from-base = true")]);
    let options = Options {
        root_dir: Some(tree.dir.clone()),
        env: Some(Default::default()),
        ..Options::default()
    };
    // "base" resolves to base.bconf through the default extension.
    let doc = bconf::parse_with("extends \"base\"\nk = 1", options).unwrap();
    assert_eq!(root(&doc).get("from-base"), Some(&Value::Bool(true)));
    assert_eq!(root(&doc).get("k"), Some(&Value::Int(1)));
}

#[test]
fn fs_loader_refuses_escaping_paths() {
    let tree = TempTree::new("escape", &[("base.bconf", "ok = true")]);
    let options = Options {
        root_dir: Some(tree.dir.clone()),
        env: Some(Default::default()),
        ..Options::default()
    };
    let err = bconf::parse_with("extends \"../outside\"", options).unwrap_err();
    assert!(err.message.contains("could not load file"), "{err}");
}

// ------------------------------------------------------------------
// Diagnostics
// ------------------------------------------------------------------

#[test]
fn render_diagnostic_over_source() {
    let source = "a = 1\nb = ref(missing)";
    let err = try_parse(source).unwrap_err();
    let rendered = bconf::render(&err, "app.bconf", source);
    assert!(rendered.contains("no value exists at key 'missing'"));
    assert!(rendered.contains("app.bconf"));
}
