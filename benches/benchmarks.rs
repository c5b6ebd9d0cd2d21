// benches/benchmarks.rs: Performance benchmarks (criterion)
//
// Hot paths of a verification cycle that do not touch the network:
//   1. Marker parsing of forge output of increasing size
//   2. Candidate cleaning and checksumming
//   3. Price cache reads under a warm cache

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use verite::harness::checksum::checksum_literals;
use verite::harness::cleaner::clean_candidate;
use verite::harness::parser::parse;
use verite::harness::{RawOutput, RunStatus};
use verite::infra::config::Config;
use verite::pricing::oracle::PricingOracle;

const TARGET: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Forge output with `noise` lines of trace text around the markers.
fn forge_output(noise: usize) -> RawOutput {
    let mut output = String::from("Ran 1 test for test/ExploitTest.t.sol:ExploitTest\nLogs:\n");
    for i in 0..noise {
        output.push_str(&format!(
            "    ├─ [{i}] 0x2e234DAe75C793f67A35089C9d99245E1C58470b::transfer(amount: {i})\n"
        ));
    }
    for line in [
        "  HARNESS_VERSION: 1",
        "  EXPLOIT_CONTRACT_ADDRESS: 0x7FA9385bE102ac3EAc297483Dd6233D62b3e1496",
        "  EXPLOIT_EXECUTED_SUCCESSFULLY: true",
        "  GAS_USED: 98765",
        "  STORAGE_SLOT_CHANGED_0: true",
        "  EXPLOIT_CAUSED_STATE_CHANGES: true",
        "  ASSET_INITIAL_ETH: 100000000000000000000000",
        "  ASSET_FINAL_ETH: 100001000000000000000000",
        "  ASSET_DECIMALS_ETH: 18",
        "  ASSET_INITIAL_USDC: 10000000000000",
        "  ASSET_FINAL_USDC: 10000320000000",
        "  ASSET_DECIMALS_USDC: 6",
        "  VALUE_EXTRACTED: 1100000000000000000",
    ] {
        output.push_str(line);
        output.push('\n');
    }
    RawOutput {
        output,
        exit_code: Some(0),
        elapsed: Duration::from_secs(3),
        status: RunStatus::Completed,
        kept_workspace: None,
    }
}

/// A candidate with `functions` helper functions and a nested interface.
fn candidate(functions: usize) -> String {
    let mut code = String::from(
        "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.20;\nimport \"forge-std/Test.sol\";\n\ncontract Attack {\n    interface IPool { function swap(uint256) external; }\n",
    );
    for i in 0..functions {
        code.push_str(&format!(
            "    function step{i}() internal {{\n        IPool(0xdbf03b407c01e7cd3cbea99509d93f8dddc8c6fb).swap({i});\n    }}\n"
        ));
    }
    code.push_str("    function exploit() external {\n        step0();\n    }\n}\n");
    code
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    let small = forge_output(0);
    group.bench_function("markers_only", |b| {
        b.iter(|| parse(black_box(&small), TARGET))
    });

    let large = forge_output(5_000);
    group.bench_function("markers_in_5000_trace_lines", |b| {
        b.iter(|| parse(black_box(&large), TARGET))
    });

    group.finish();
}

fn bench_cleaner(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleaner");

    let short = candidate(5);
    group.bench_function("clean_5_functions", |b| {
        b.iter(|| clean_candidate(black_box(&short)))
    });

    let long = candidate(200);
    group.bench_function("clean_200_functions", |b| {
        b.iter(|| clean_candidate(black_box(&long)))
    });
    group.bench_function("checksum_200_functions", |b| {
        b.iter(|| checksum_literals(black_box(&long), TARGET))
    });

    group.finish();
}

fn bench_price_cache(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let oracle = PricingOracle::offline(&Config::default());
    rt.block_on(oracle.warmup(1, None));

    c.bench_function("cached_get_price", |b| {
        b.iter(|| rt.block_on(oracle.get_price(black_box("USDC"), 1, None)))
    });
}

criterion_group!(benches, bench_parser, bench_cleaner, bench_price_cache);
criterion_main!(benches);
