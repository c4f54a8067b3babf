//! End-to-end pipeline tests with a scripted backend.

use lazyseq::backend::BackendConfig;
use lazyseq::counterexample::parse::STATE_SEPARATOR;
use lazyseq::counterexample::TraceEvent;
use lazyseq::encoder::{Expr, Function, Program, Stmt, SymbolTable};
use lazyseq::{
    BackendKind, Coord, EncodeConfig, LineMapChain, Pipeline, PipelineConfig, ScheduleMode,
    VarNameMap, VerificationStatus, WitnessRequest,
};
use std::time::Duration;

/// main (line 2) creates a worker (line 10) that writes a shared global.
fn two_thread_program() -> (Program, SymbolTable) {
    let mut sym = SymbolTable::new();
    sym.add_global("x");
    sym.set_function_counts("worker", 1, 0, 1);

    let program = Program {
        globals: vec![Stmt::decl(1, "int", "x", Some(Expr::num(0)))],
        functions: vec![
            Function::new("main", "int", 2).with_body(vec![
                Stmt::call(
                    3,
                    "pthread_create",
                    vec![
                        Expr::unary("&", Expr::id("t")),
                        Expr::num(0),
                        Expr::id("worker"),
                        Expr::num(0),
                    ],
                ),
                Stmt::expr(4, Expr::assign(Expr::id("x"), Expr::num(1))),
            ]),
            Function::new("worker", "void *", 10).with_body(vec![
                Stmt::expr(11, Expr::assign(Expr::id("x"), Expr::num(2))),
                Stmt::call(12, "pthread_exit", vec![Expr::num(0)]),
            ]),
        ],
    };
    (program, sym)
}

fn encode_config() -> EncodeConfig {
    EncodeConfig {
        mode: ScheduleMode::RoundRobin { rounds: 2 },
        ..EncodeConfig::default()
    }
}

fn scripted_backend(script: String) -> BackendConfig {
    BackendConfig {
        kind: BackendKind::Cbmc,
        binary: Some("/bin/sh".to_string()),
        args: vec!["-c".to_string(), script],
        timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn test_encode_only_run() {
    let (program, sym) = two_thread_program();
    let pipeline = Pipeline::new(PipelineConfig {
        encode: encode_config(),
        backend: None,
        witness: None,
    });
    let outcome = pipeline
        .run(program, &sym, &VarNameMap::new(), LineMapChain::new())
        .await
        .unwrap();

    assert!(outcome.encoded.text.contains("int main(void) {"));
    assert!(outcome.encoded.text.contains("void *worker_0(void *__cs_arg)"));
    assert_eq!(outcome.chain.stage_count(), 1);
    assert!(outcome.result.is_none());
    assert!(outcome.trace.is_none());
}

#[tokio::test]
async fn test_line_map_round_trips_through_encoding() {
    let (program, sym) = two_thread_program();
    let pipeline = Pipeline::new(PipelineConfig {
        encode: encode_config(),
        backend: None,
        witness: None,
    });
    let outcome = pipeline
        .run(program, &sym, &VarNameMap::new(), LineMapChain::new())
        .await
        .unwrap();

    // every original statement line survives a forward-then-backward walk
    for original in [3u32, 4, 11, 12] {
        let out_line = outcome.chain.forward(original).unwrap();
        assert_eq!(outcome.chain.resolve(out_line), Some(Coord::line(original)));
    }
}

#[tokio::test]
async fn test_safe_verdict_produces_no_trace() {
    let (program, sym) = two_thread_program();
    let pipeline = Pipeline::new(PipelineConfig {
        encode: encode_config(),
        backend: Some(scripted_backend(
            "echo VERIFICATION SUCCESSFUL".to_string(),
        )),
        witness: None,
    });
    let outcome = pipeline
        .run(program, &sym, &VarNameMap::new(), LineMapChain::new())
        .await
        .unwrap();

    let result = outcome.result.unwrap();
    assert_eq!(result.status, VerificationStatus::Safe);
    assert!(outcome.trace.is_none());
    assert!(outcome.trace_text.is_none());
    assert!(outcome.witness.is_none());
}

fn violating_trace() -> String {
    format!(
        "Counterexample:\n\n\
         State 1 file seq.c line 999 function main thread 0\n\
         {STATE_SEPARATOR}\n\
         \x20 __cs_thread_index=1 (00000001)\n\n\
         Violated property:\n\
         \x20 file seq.c line 999 function main\n\
         \x20 assertion 0 != 0\n\
         \x20 0 != 0\n\n\
         VERIFICATION FAILED\n"
    )
}

#[tokio::test]
async fn test_violation_is_decoded_and_witnessed() {
    let (program, sym) = two_thread_program();
    let script = format!("cat <<'EOF'\n{}EOF\n", violating_trace());
    let pipeline = Pipeline::new(PipelineConfig {
        encode: encode_config(),
        backend: Some(scripted_backend(script)),
        witness: Some(WitnessRequest {
            program_file: "input.c".to_string(),
            program_source: "int x = 0;\n".to_string(),
            entry_line: 2,
            creation_time: Some("2026-01-01T00:00:00Z".to_string()),
        }),
    });
    let outcome = pipeline
        .run(program, &sym, &VarNameMap::new(), LineMapChain::new())
        .await
        .unwrap();

    let result = outcome.result.as_ref().unwrap();
    assert_eq!(result.status, VerificationStatus::Unsafe);

    let trace = outcome.trace.as_ref().unwrap();
    assert_eq!(trace.events.len(), 1);
    match &trace.events[0] {
        TraceEvent::ContextSwitch { thread, name, .. } => {
            assert_eq!(*thread, 1);
            assert_eq!(name, "worker");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let text = outcome.trace_text.as_ref().unwrap();
    assert!(text.starts_with("Counterexample:\n\n"));
    assert!(text.contains("thread 1 (worker) scheduled"));
    assert!(text.contains("Violated property:"));
    assert!(text.contains("VERIFICATION FAILED"));

    let witness = outcome.witness.as_ref().unwrap();
    assert!(witness.contains("<data key=\"witness-type\">violation_witness</data>"));
    assert!(witness.contains("<data key=\"programfile\">input.c</data>"));
    assert!(witness.contains("<data key=\"creationtime\">2026-01-01T00:00:00Z</data>"));
}

#[tokio::test]
async fn test_decoding_is_deterministic() {
    let (program, sym) = two_thread_program();
    let pipeline = Pipeline::new(PipelineConfig {
        encode: encode_config(),
        backend: None,
        witness: None,
    });
    let varnames = VarNameMap::new();
    let outcome = pipeline
        .run(program, &sym, &varnames, LineMapChain::new())
        .await
        .unwrap();

    let raw = violating_trace();
    let first = {
        let decoder = pipeline.decoder(&outcome, &varnames, BackendKind::Cbmc);
        decoder.render(&decoder.decode(&raw))
    };
    let second = {
        let decoder = pipeline.decoder(&outcome, &varnames, BackendKind::Cbmc);
        decoder.render(&decoder.decode(&raw))
    };
    assert_eq!(first, second);
    assert!(first.contains("thread 1 (worker) scheduled"));
}
