//! End-to-end pipeline tests with scripted and real process backends.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tc_analyzer::SourceAnalyzer;
use tc_backend::{BackendError, CompileCheck, GenerationBackend, Invocation, ProcessBackend};
use tc_core::{FailureReason, GenerationOptions};
use tc_generator::report::SUMMARY_FILE_NAME;
use tc_generator::{
    GenerationOrchestrator, Pipeline, PipelineError, PipelineSettings, RetryPolicy, UnitInput,
    UnitOutcome,
};
use tc_mocks::MockCatalog;

/// Answers each prompt through a closure and records what it was asked.
struct Scripted<F> {
    respond: F,
    available: bool,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl<F> Scripted<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            available: true,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<F> GenerationBackend for Scripted<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn check_available(&self) -> Result<(), BackendError> {
        if self.available {
            Ok(())
        } else {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }
    }

    async fn invoke(&self, prompt: &str, _timeout: Duration) -> Invocation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Invocation::Success {
            output: (self.respond)(prompt),
            elapsed: Duration::from_millis(3),
        }
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn out(&self) -> PathBuf {
        self.root.join("out")
    }

    fn cache(&self) -> PathBuf {
        self.root.join("cache")
    }

    fn written(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.out()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn pipeline<B: GenerationBackend + 'static>(
    backend: B,
    ws: &Workspace,
    mock_roots: &[PathBuf],
    jobs: usize,
    timeout: Duration,
) -> Pipeline<B> {
    let orchestrator = GenerationOrchestrator::new(backend, timeout).with_retry_policy(RetryPolicy {
        backoff: Duration::ZERO,
        ..Default::default()
    });
    let settings = PipelineSettings {
        output_dir: ws.out(),
        cache_dir: Some(ws.cache()),
        jobs,
        compile_check: None,
    };
    Pipeline::new(
        SourceAnalyzer::new(true),
        MockCatalog::discover(mock_roots),
        orchestrator,
        GenerationOptions::new("llama3"),
        settings,
    )
}

const STRING_UTILS: &str = "class StringUtils { std::string trim(const std::string&); };\n";

const TRIM_RESPONSE: &str = "Here is the test body:\n\n```cpp\n    StringUtils utils;\n    EXPECT_EQ(utils.trim(\"  a \"), \"a\");\n```\n";

#[tokio::test]
async fn string_utils_generates_one_test_file() {
    let ws = Workspace::new();
    let header = ws.write("src/StringUtils.h", STRING_UTILS);

    let backend = Scripted::new(|_: &str| TRIM_RESPONSE.to_string());
    let prompts = Arc::clone(&backend.prompts);
    let report = pipeline(backend, &ws, &[], 1, Duration::from_secs(5))
        .run(vec![UnitInput::new(&header)])
        .await
        .unwrap();

    assert_eq!((report.generated, report.skipped, report.failed), (1, 0, 0));
    let unit = &report.units[0];
    assert_eq!(unit.class_name.as_deref(), Some("StringUtils"));
    assert_eq!(unit.attempts, 1);
    assert!(unit.mocks.is_empty());
    assert!(unit.unmocked.is_empty());

    assert_eq!(ws.written(), vec!["StringUtilsTest.cpp"]);
    let source = fs::read_to_string(ws.out().join("StringUtilsTest.cpp")).unwrap();
    assert!(source.contains(
        "TEST_F(StringUtilsTest, Generated) {\n    // Verifier: llama3\n    StringUtils utils;\n    EXPECT_EQ(utils.trim(\"  a \"), \"a\");\n}"
    ));
    assert!(source.contains("#include \"StringUtils.h\""));
    assert_eq!(source.matches("TEST_F(").count(), 1);

    let prompt = &prompts.lock().unwrap()[0];
    assert!(prompt.contains("std::string trim(const std::string&);"));
    assert!(prompt.contains("## AVAILABLE MOCKS\n\nNone."));

    assert!(ws.cache().join("StringUtils_test_context.json").is_file());
    assert!(ws.cache().join(SUMMARY_FILE_NAME).is_file());
}

#[tokio::test]
async fn unreachable_backend_aborts_before_any_attempt() {
    let ws = Workspace::new();
    let a = ws.write("src/StringUtils.h", STRING_UTILS);
    let b = ws.write("src/Parser.h", "class Parser { public: int parse(const char* text); };");

    let mut backend = Scripted::new(|_: &str| TRIM_RESPONSE.to_string());
    backend.available = false;
    let calls = Arc::clone(&backend.calls);

    let result = pipeline(backend, &ws, &[], 1, Duration::from_secs(5))
        .run(vec![UnitInput::new(a), UnitInput::new(b)])
        .await;

    match result {
        Err(PipelineError::BackendUnavailable(message)) => assert!(message.contains("connection refused")),
        other => panic!("expected BackendUnavailable, got {:?}", other.map(|r| r.total())),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(ws.written().is_empty());
    assert!(!ws.cache().join("StringUtils_test_context.json").exists());
}

#[tokio::test]
async fn missing_model_program_is_unavailable() {
    let ws = Workspace::new();
    let header = ws.write("src/StringUtils.h", STRING_UTILS);
    let backend = ProcessBackend::new("no-such-model-runtime", Vec::new());

    let result = pipeline(backend, &ws, &[], 1, Duration::from_secs(5))
        .run(vec![UnitInput::new(header)])
        .await;
    assert!(matches!(result, Err(PipelineError::BackendUnavailable(_))));
}

#[tokio::test]
async fn timeout_fails_the_unit_without_writing() {
    let ws = Workspace::new();
    let header = ws.write("src/StringUtils.h", STRING_UTILS);
    let backend = ProcessBackend::new("sh", vec!["-c".to_string(), "sleep 5".to_string()]);

    let report = pipeline(backend, &ws, &[], 1, Duration::from_millis(300))
        .run(vec![UnitInput::new(header)])
        .await
        .unwrap();

    let unit = &report.units[0];
    assert_eq!(unit.attempts, 2);
    match &unit.outcome {
        UnitOutcome::Failed { reason, .. } => {
            assert_eq!(reason, &FailureReason::InvocationTimeout { timeout_ms: 300 })
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(unit.elapsed < Duration::from_secs(4));
    assert!(ws.written().is_empty());
    assert!(ws.cache().join("StringUtils.raw.txt").is_file());
}

#[tokio::test]
async fn process_backend_reads_prompt_from_stdin() {
    let ws = Workspace::new();
    let header = ws.write("src/StringUtils.h", STRING_UTILS);
    // Answers only if the prompt names the class.
    let script = "grep -q StringUtils && printf '```cpp\\nEXPECT_TRUE(true);\\n```\\n'";
    let backend = ProcessBackend::new("sh", vec!["-c".to_string(), script.to_string()]);

    let report = pipeline(backend, &ws, &[], 1, Duration::from_secs(10))
        .run(vec![UnitInput::new(header)])
        .await
        .unwrap();
    assert_eq!(report.generated, 1);
    assert_eq!(ws.written(), vec!["StringUtilsTest.cpp"]);
}

#[tokio::test]
async fn mocks_are_bound_and_included() {
    let ws = Workspace::new();
    let header = ws.write(
        "src/OrderService.h",
        r#"#pragma once
#include "Database.h"

namespace shop {

class OrderService {
public:
    explicit OrderService(Database& db);
    bool place(int orderId, double amount);
    int count() const;

private:
    Database& db_;
};

}  // namespace shop
"#,
    );
    ws.write(
        "test/mocks/MockDatabase.h",
        r#"#pragma once
#include <gmock/gmock.h>
#include "Database.h"

class MockDatabase : public Database {
public:
    MOCK_METHOD(bool, save, (int id, double amount), (override));
    MOCK_METHOD(int, size, (), (const, override));
};
"#,
    );

    let backend = Scripted::new(|_: &str| {
        "```cpp\n// CASE: PlacesOrder\nMockDatabase db;\nEXPECT_CALL(db, save(1, 2.0)).WillOnce(Return(true));\nOrderService service(db);\nEXPECT_TRUE(service.place(1, 2.0));\n// CASE: StartsEmpty\nMockDatabase db;\nEXPECT_EQ(OrderService(db).count(), 0);\n```"
            .to_string()
    });
    let prompts = Arc::clone(&backend.prompts);

    let report = pipeline(backend, &ws, &[ws.root.join("test/mocks")], 1, Duration::from_secs(5))
        .run(vec![UnitInput::new(header)])
        .await
        .unwrap();

    let unit = &report.units[0];
    assert_eq!(unit.mocks, vec!["MockDatabase"]);
    assert!(unit.unmocked.is_empty());
    assert!(matches!(unit.outcome, UnitOutcome::Generated { cases: 2, .. }));

    let prompt = &prompts.lock().unwrap()[0];
    assert!(prompt.contains("`MockDatabase` mocks `Database`"));
    assert!(prompt.contains("mocked methods: save, size"));

    let source = fs::read_to_string(ws.out().join("OrderServiceTest.cpp")).unwrap();
    assert!(source.contains("#include \"MockDatabase.h\""));
    assert!(source.contains("#include \"OrderService.h\""));
    assert!(source.contains("using namespace shop;"));
    assert!(source.contains("TEST_F(OrderServiceTest, PlacesOrder) {\n    // Verifier: llama3\n"));
    assert!(source.contains("TEST_F(OrderServiceTest, StartsEmpty) {"));
}

#[tokio::test]
async fn per_unit_outcomes_in_input_order() {
    let ws = Workspace::new();
    let inputs = vec![
        UnitInput::new(ws.write("src/StringUtils.h", STRING_UTILS)),
        UnitInput::new(ws.write("src/constants.h", "#pragma once\nconstexpr int kMax = 4;\n")),
        UnitInput::new(ws.write("src/Parser.h", "class Parser { public: int parse(const char* text); };")),
        UnitInput::new(ws.write("src/Lexer.h", "class Lexer { public: bool next(); };")),
        UnitInput::new(ws.root.join("src/Missing.h")),
    ];

    let backend = Scripted::new(|prompt: &str| {
        if prompt.contains("`Parser`") {
            "I am not able to write tests for a parser.".to_string()
        } else if prompt.contains("`Lexer`") {
            "```cpp\nLexer lexer;\nlexer.next();\n```".to_string()
        } else {
            TRIM_RESPONSE.to_string()
        }
    });

    let report = pipeline(backend, &ws, &[], 3, Duration::from_secs(5))
        .run(inputs)
        .await
        .unwrap();

    let labels: Vec<&str> = report.units.iter().map(|u| u.outcome.label()).collect();
    assert_eq!(labels, vec!["generated", "skipped", "failed", "failed", "failed"]);
    assert_eq!((report.generated, report.skipped, report.failed), (1, 1, 3));

    let reasons: Vec<&str> = report
        .units
        .iter()
        .filter_map(|u| match &u.outcome {
            UnitOutcome::Failed { reason, .. } => Some(reason.name()),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec!["NoCodeBlockFound", "UnrecognizedTestBody", "Io"]);

    // Raw output is preserved for failed units.
    match &report.units[2].outcome {
        UnitOutcome::Failed { raw_output, .. } => assert!(raw_output.contains("not able")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(ws.cache().join("Parser.raw.txt").is_file());
    assert!(ws.cache().join("Lexer.raw.txt").is_file());
    assert_eq!(ws.written(), vec!["StringUtilsTest.cpp"]);
}

#[tokio::test]
async fn failed_compile_check_blocks_the_write() {
    let ws = Workspace::new();
    let header = ws.write("src/StringUtils.h", STRING_UTILS);
    let backend = Scripted::new(|_: &str| TRIM_RESPONSE.to_string());

    let orchestrator = GenerationOrchestrator::new(backend, Duration::from_secs(5));
    let mut settings = PipelineSettings::new(ws.out());
    settings.compile_check = Some(CompileCheck::new(
        "sh",
        vec![
            "-c".to_string(),
            "echo \"$0:3:10: error: 'StringUtils' does not name a type\" >&2; exit 1".to_string(),
        ],
        Duration::from_secs(10),
    ));
    let pipeline = Pipeline::new(
        SourceAnalyzer::new(true),
        MockCatalog::new(),
        orchestrator,
        GenerationOptions::new("llama3"),
        settings,
    );

    let report = pipeline.run(vec![UnitInput::new(header)]).await.unwrap();
    match &report.units[0].outcome {
        UnitOutcome::Failed {
            reason: FailureReason::CompileCheckFailed { message },
            ..
        } => assert!(message.contains("does not name a type")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(ws.written().is_empty());
}

/// Stands in for `g++ -fsyntax-only`: every quoted include of the checked
/// file must exist under one of the `-I` directories.
const INCLUDE_RESOLVER: &str = r#"
for src; do :; done
dirs=
while [ $# -gt 1 ]; do
  if [ "$1" = -I ]; then dirs="$dirs $2"; shift 2; else shift; fi
done
for inc in $(sed -n 's/^#include "\(.*\)"$/\1/p' "$src"); do
  found=
  for d in $dirs; do if [ -f "$d/$inc" ]; then found=1; fi; done
  if [ -z "$found" ]; then echo "$src:1:1: fatal error: $inc: No such file or directory" >&2; exit 1; fi
done
"#;

#[tokio::test]
async fn compile_check_resolves_header_and_mock_includes() {
    let ws = Workspace::new();
    let string_utils = ws.write("src/StringUtils.h", STRING_UTILS);
    let order_service = ws.write(
        "src/orders/OrderService.h",
        "class OrderService {\npublic:\n    explicit OrderService(Database& db);\n    int count() const;\n};\n",
    );
    ws.write(
        "test/mocks/db/MockDatabase.h",
        "class MockDatabase : public Database {\npublic:\n    MOCK_METHOD(int, size, (), (const, override));\n};\n",
    );

    let backend = Scripted::new(|_: &str| "```cpp\nEXPECT_TRUE(true);\n```".to_string());
    let orchestrator = GenerationOrchestrator::new(backend, Duration::from_secs(5));
    let mut settings = PipelineSettings::new(ws.out());
    // No include directories configured.
    settings.compile_check = Some(CompileCheck::new(
        "sh",
        vec!["-c".to_string(), INCLUDE_RESOLVER.to_string(), "check".to_string()],
        Duration::from_secs(10),
    ));
    let pipeline = Pipeline::new(
        SourceAnalyzer::new(true),
        MockCatalog::discover(&[ws.root.join("test/mocks")]),
        orchestrator,
        GenerationOptions::new("llama3"),
        settings,
    );

    let report = pipeline
        .run(vec![UnitInput::new(string_utils), UnitInput::new(order_service)])
        .await
        .unwrap();

    for unit in &report.units {
        assert!(
            matches!(unit.outcome, UnitOutcome::Generated { .. }),
            "unexpected outcome {:?}",
            unit.outcome
        );
    }
    assert_eq!(report.units[1].mocks, vec!["MockDatabase"]);
    let source = fs::read_to_string(ws.out().join("OrderServiceTest.cpp")).unwrap();
    assert!(source.contains("#include \"db/MockDatabase.h\""));
    assert_eq!(ws.written(), vec!["OrderServiceTest.cpp", "StringUtilsTest.cpp"]);
}

#[tokio::test]
async fn same_class_in_two_directories_is_written_once() {
    let ws = Workspace::new();
    let first = ws.write("a/Parser.h", "class Parser { public: int parse(const char* text); };");
    let second = ws.write("b/Parser.h", "class Parser { public: bool parse(); };");

    let backend = Scripted::new(|_: &str| "```cpp\nEXPECT_EQ(Parser().parse(\"1\"), 1);\n```".to_string());
    let calls = Arc::clone(&backend.calls);

    let report = pipeline(backend, &ws, &[], 2, Duration::from_secs(5))
        .run(vec![UnitInput::new(&first), UnitInput::new(&second)])
        .await
        .unwrap();

    let labels: Vec<&str> = report.units.iter().map(|u| u.outcome.label()).collect();
    assert_eq!(labels, vec!["generated", "failed"]);
    match &report.units[1].outcome {
        UnitOutcome::Failed {
            reason: FailureReason::OutputCollision { path, first_header },
            ..
        } => {
            assert!(path.ends_with("ParserTest.cpp"));
            assert_eq!(first_header, &first.display().to_string());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.units[1].class_name.as_deref(), Some("Parser"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ws.written(), vec!["ParserTest.cpp"]);
}

#[test]
fn target_dir_discovery_feeds_the_pipeline() {
    let ws = Workspace::new();
    ws.write("src/StringUtils.h", STRING_UTILS);
    ws.write("src/StringUtils.cpp", "std::string StringUtils::trim(const std::string& s) { return s; }");
    ws.write("src/mocks/MockClock.h", "class MockClock {};");

    let units = tc_generator::discover_units(&ws.root.join("src")).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(
        units[0].implementation.as_deref(),
        Some(ws.root.join("src/StringUtils.cpp").as_path())
    );
}
