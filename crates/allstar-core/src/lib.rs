pub mod atn;
pub mod atn_builder;
pub mod closure;
pub mod config;
pub mod conflict;
pub mod context;
pub mod dfa;
pub mod error;
pub mod grammar;
pub mod interpreter;
pub mod listener;
pub mod ll1;
pub mod observer;
pub mod predictor;
pub mod profiling;
pub mod report;
pub mod semantic;
pub mod symbol_set;
pub mod token_stream;
pub mod token_stream_vec;

pub use atn::{Atn, AtnState, StateKind, StateNumber, Transition, EOF, EPSILON, INVALID_ALT};
pub use atn_builder::{AtnBuilder, Element};
pub use closure::Closure;
pub use config::{AltSet, AtnConfig, AtnConfigSet};
pub use conflict::PredictionMode;
pub use context::{CallContext, PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE};
pub use dfa::{DecisionCache, Dfa, DfaEdge, DfaState, SharedDecisionCache};
pub use error::{AtnError, AtnErrorKind, NoViableAlt, PredicateError, RecognitionError};
pub use grammar::{ElementSpec, GrammarSpec, RuleSpec};
pub use interpreter::{
    parse_batch, BatchOptions, BatchResult, ParseOutcome, ParserInterpreter, PredictionRecord,
};
pub use listener::{Diagnostic, DiagnosticListener, NoopListener, PredictionListener};
pub use ll1::Ll1Analyzer;
pub use observer::{NoopObserver, PredictionObserver};
pub use predictor::{PredictionHooks, Predictor, PredictorOptions};
pub use profiling::{DecisionInfo, ParseInfo, Profiler, ProfilingPredictor};
pub use report::ReportColumn;
pub use semantic::{PredicateTable, SemanticContext, SemanticEvaluator};
pub use symbol_set::SymbolSet;
pub use token_stream::TokenStream;
pub use token_stream_vec::VecTokenStream;
