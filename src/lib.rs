//! # intrange-rs: Interprocedural Integer Range Analysis
//!
//! **`intrange-rs`** computes, for every integer value of a program in SSA form, a range that is
//! guaranteed to contain every value the variable can take at run time.
//! The ranges feed overflow and out-of-bounds checkers: an operation whose range provably violates a bound,
//! or a branch whose condition can never hold, is reported.
//!
//! ## What is a range?
//!
//! An [`IntRange`][crate::range::IntRange] is a half-open interval `[lower, upper)` over integers of a fixed bit width.
//! Intervals **wrap**, exactly like two's-complement arithmetic does, so the same range can be read as a signed or an unsigned set.
//! Every integer operation has a transfer function that returns the exact interval abstraction of the operation.
//!
//! ## Key Features
//!
//! - **Path-sensitive**: ranges are narrowed along branch and switch edges, and branch directions whose condition can never hold are reported.
//! - **Interprocedural**: call-site arguments flow into parameters, returned values into call results, and stores into global variables.
//! - **Global arrays**: element ranges are tracked per element, and indexed accesses that may run past the end are reported.
//! - **Always terminates**: loops are analyzed in a single forward pass that ignores back-edges; unknown data is the full range.
//!
//! ## Basic Usage
//!
//! ```rust
//! use intrange_rs::analysis::RangeAnalysis;
//! use intrange_rs::config::AnalysisConfig;
//! use intrange_rs::ir::{BinaryOp, Linkage, Module, Type};
//! use intrange_rs::predicate::IntPredicate;
//! use intrange_rs::range::IntRange;
//!
//! // 1. Build a program: f(p) { x = p % 100; if (x < 10) {...} else {...} }
//! let mut module = Module::new();
//! let f = module.add_function("f", &[Type::Int(32)], Type::Void, Linkage::External);
//! let mut b = module.build(f);
//! let entry = b.block("entry");
//! let small = b.block("small");
//! let large = b.block("large");
//! let p = b.param(0);
//! let hundred = b.const_int(32, 100);
//! let x = b.binary(BinaryOp::URem, p, hundred);
//! let ten = b.const_int(32, 10);
//! let cmp = b.icmp(IntPredicate::Ult, x, ten);
//! b.cond_br(cmp, small, large);
//! b.switch_to(small);
//! b.ret(None);
//! b.switch_to(large);
//! b.ret(None);
//!
//! // 2. Run the analysis
//! let mut analysis = RangeAnalysis::new(&module, AnalysisConfig::default());
//! analysis.analyze_module();
//!
//! // 3. Query ranges
//! assert_eq!(analysis.range_at(f, entry, x), Some(IntRange::from_u64(32, 0, 100)));
//! assert_eq!(analysis.range_at(f, small, x), Some(IntRange::from_u64(32, 0, 10)));
//! assert_eq!(analysis.range_at(f, large, x), Some(IntRange::from_u64(32, 10, 100)));
//! ```
//!
//! ## Core Components
//!
//! - **[`range`]**: The interval domain.
//! - **[`ir`]**: The program representation and its builder.
//! - **[`transfer`]**: One transfer function per instruction kind.
//! - **[`propagate`]**: Block-by-block propagation and branch narrowing.
//! - **[`analysis`]**: The module driver and query interface.

pub mod analysis;
pub mod apint;
pub mod cfg;
pub mod config;
pub mod ir;
pub mod memory;
pub mod predicate;
pub mod propagate;
pub mod range;
pub mod store;
pub mod transfer;
