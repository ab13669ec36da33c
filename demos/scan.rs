use clap::Parser;
use log::info;
use simplelog::LevelFilter;

use intrange_rs::analysis::RangeAnalysis;
use intrange_rs::apint::ApInt;
use intrange_rs::config::{AnalysisConfig, SinkFunction};
use intrange_rs::ir::{BinaryOp, GlobalShape, Linkage, Module, Type};
use intrange_rs::predicate::IntPredicate;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Sink functions, as `name` or `name:ARG=SOURCE,...`.
    #[arg(long = "sink", value_name = "SINK", default_value = "copy:1=read_len")]
    sinks: Vec<SinkFunction>,

    /// Maximum number of whole-module passes.
    #[clap(long, value_name = "INT", default_value = "8")]
    max_passes: usize,

    /// Log level (off, error, warn, info, debug, trace).
    #[clap(long, value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,
}

/// A small program with one of each finding:
///
/// ```text
/// int table[4] = {10, 20, 30, 40};
/// int hits = 0;
///
/// static int lookup(int i) { hits = hits + 1; return table[i]; }
///
/// int main(int n) {
///     int len = read_len();
///     int v = lookup(n % 6);      // index may reach 5
///     int small = len & 15;
///     if (small == 100) return 0; // never taken
///     copy(buf, small);
///     return v;
/// }
/// ```
fn build_program() -> Module {
    let mut module = Module::new();
    let init = [10, 20, 30, 40].iter().map(|&v| ApInt::new(32, v)).collect();
    let table = module.add_global("table", 32, GlobalShape::Array { len: 4 }, Some(init));
    let hits = module.add_global("hits", 32, GlobalShape::Scalar, Some(vec![ApInt::new(32, 0)]));
    let table = module.global(table).addr;
    let hits = module.global(hits).addr;

    let read_len = module.add_function("read_len", &[], Type::Int(32), Linkage::External);
    let copy = module.add_function("copy", &[Type::Ptr, Type::Int(32)], Type::Void, Linkage::External);
    let lookup = module.add_function("lookup", &[Type::Int(32)], Type::Int(32), Linkage::Internal);
    let main = module.add_function("main", &[Type::Int(32)], Type::Int(32), Linkage::External);

    let mut b = module.build(lookup);
    b.block("entry");
    let i = b.param(0);
    let zero = b.const_int(32, 0);
    let one = b.const_int(32, 1);
    let count = b.load(Type::Int(32), hits);
    let count = b.binary(BinaryOp::Add, count, one);
    b.store(count, hits);
    let slot = b.element_ptr(table, &[zero, i]);
    let v = b.load(Type::Int(32), slot);
    b.ret(Some(v));

    let mut b = module.build(main);
    b.block("entry");
    let bad = b.block("bad");
    let good = b.block("good");
    let n = b.param(0);
    let len = b.call(read_len, &[]);
    b.named(len, "len");
    let six = b.const_int(32, 6);
    let k = b.binary(BinaryOp::URem, n, six);
    let v = b.call(lookup, &[k]);
    b.named(v, "v");
    let mask = b.const_int(32, 15);
    let small = b.binary(BinaryOp::And, len, mask);
    b.named(small, "small");
    let hundred = b.const_int(32, 100);
    let cmp = b.icmp(IntPredicate::Eq, small, hundred);
    b.cond_br(cmp, bad, good);
    b.switch_to(bad);
    let zero = b.const_int(32, 0);
    b.ret(Some(zero));
    b.switch_to(good);
    let buf = b.alloca();
    b.call(copy, &[buf, small]);
    b.ret(Some(v));

    module
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let module = build_program();
    let config = AnalysisConfig {
        sinks: args.sinks,
        max_passes: args.max_passes,
        ..AnalysisConfig::default()
    };
    let mut analysis = RangeAnalysis::new(&module, config);
    let passes = analysis.analyze_module();
    info!("analysis finished after {} passes", passes);

    println!("Impossible branches:");
    for branch in analysis.impossible_branches() {
        println!("  {} ({})", branch, module.label(branch.cmp));
    }

    println!("Out-of-range accesses:");
    for access in analysis.out_of_range_accesses() {
        println!("  {} ({})", access, module.global(access.global).name);
    }

    println!("Return ranges:");
    for func in module.functions() {
        if let Some(range) = analysis.return_range(func) {
            println!("  {} -> {}", module.function(func).name, range);
        }
    }

    println!("Globals:");
    for global in module.globals() {
        if let Some(range) = analysis.global_range(global) {
            println!("  {} = {}", module.global(global).name, range);
        }
    }

    println!("Taint sources:");
    for sink in &analysis.config().sinks {
        for source in sink.sources.values() {
            if let Some(range) = analysis.taint_source_range(source) {
                println!("  {} (via {}) = {}", source, sink.name, range);
            }
        }
    }

    println!("\nAll done in {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
