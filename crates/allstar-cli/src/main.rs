use allstar_core::report;
use allstar_core::{
    parse_batch, Atn, BatchOptions, CallContext, DecisionInfo, Diagnostic, GrammarSpec, ParseInfo,
    ParserInterpreter, PredicateTable, PredictionMode, PredictionRecord, RecognitionError,
    VecTokenStream,
};
use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "allstar")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, value_enum, default_value = "json", global = true)]
    format: OutputFormat,

    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Parse token files from a start rule.
    Parse(ParseArgs),
    /// Run a single prediction at the start of a token file.
    Predict(PredictArgs),
}

#[derive(Args)]
struct PredictionArgs {
    #[arg(long, value_enum, default_value = "ll")]
    mode: ModeArg,

    /// Include ambiguity and full-context reports in the result.
    #[arg(long)]
    diagnostics: bool,

    /// Fixed predicate outcome, e.g. `expr:0=false`.
    #[arg(long = "pred", value_name = "RULE:INDEX=BOOL")]
    preds: Vec<String>,

    /// Outcome of predicates not given with --pred.
    #[arg(long)]
    pred_default: Option<bool>,
}

#[derive(Args)]
struct ParseArgs {
    grammar: PathBuf,

    #[arg(required = true)]
    tokens: Vec<PathBuf>,

    #[arg(long)]
    start_rule: String,

    #[command(flatten)]
    prediction: PredictionArgs,

    /// Write the per-decision profile as CSV.
    #[arg(long)]
    profile: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    jobs: usize,

    #[arg(long)]
    shared_cache: bool,
}

#[derive(Args)]
struct PredictArgs {
    grammar: PathBuf,

    tokens: PathBuf,

    #[arg(long)]
    decision: usize,

    /// Invoking states of the active rules, outermost first.
    #[arg(long, value_delimiter = ',')]
    call_stack: Vec<usize>,

    #[arg(long, default_value_t = 0)]
    precedence: i32,

    #[command(flatten)]
    prediction: PredictionArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sll,
    Ll,
    #[value(name = "ll-exact")]
    LlExact,
}

impl ModeArg {
    fn mode(self) -> PredictionMode {
        match self {
            ModeArg::Sll => PredictionMode::Sll,
            ModeArg::Ll => PredictionMode::Ll,
            ModeArg::LlExact => PredictionMode::LlExactAmbigDetection,
        }
    }
}

#[derive(Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Pass,
    Fail,
    Error,
}

#[derive(Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum ReasonKind {
    InvalidInput,
    InvalidGrammar,
}

#[derive(Serialize)]
struct Reason {
    kind: ReasonKind,
    message: String,
}

#[derive(Serialize)]
struct ResultJson {
    schema_version: String,
    tool: ToolInfo,
    invocation: Invocation,
    inputs: Vec<InputInfo>,
    status: Status,
    exit_code: i32,
    started_at: String,
    finished_at: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<Reason>,
    results: Vec<InputResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<ProfileSummary>,
}

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    version: String,
    git_sha: String,
}

#[derive(Serialize)]
struct Invocation {
    command: String,
    args: Vec<String>,
    format: String,
    mode: String,
    jobs: usize,
    shared_cache: bool,
}

#[derive(Serialize)]
struct InputInfo {
    path: String,
    sha256: String,
}

#[derive(Serialize)]
struct InputResult {
    path: String,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    consumed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    predictions: Vec<PredictionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<SyntaxError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Vec<Diagnostic>>,
}

#[derive(Serialize)]
struct SyntaxError {
    kind: String,
    message: String,
    offending_index: usize,
}

#[derive(Serialize)]
struct ProfileSummary {
    csv: Option<String>,
    parse_info: ParseInfo,
}

struct Execution {
    invocation: Invocation,
    inputs: Vec<InputInfo>,
    status: Status,
    reason: Option<Reason>,
    results: Vec<InputResult>,
    profile: Option<ProfileSummary>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("tool error: {err:#}");
            2
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let started_at = Utc::now();
    let timer = Instant::now();

    let execution = match &cli.command {
        Command::Parse(args) => execute_parse(&cli, args)?,
        Command::Predict(args) => execute_predict(&cli, args)?,
    };
    let exit_code = match execution.status {
        Status::Pass => 0,
        Status::Fail => 1,
        Status::Error => 2,
    };

    let finished_at = Utc::now();
    let duration_ms = timer.elapsed().as_millis() as u64;

    let result = ResultJson {
        schema_version: "0.1".to_string(),
        tool: ToolInfo {
            name: "allstar".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: std::env::var("ALLSTAR_GIT_SHA").unwrap_or_else(|_| "UNKNOWN".to_string()),
        },
        invocation: execution.invocation,
        inputs: execution.inputs,
        status: execution.status,
        exit_code,
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        finished_at: finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        duration_ms,
        reason: execution.reason,
        results: execution.results,
        profile: execution.profile,
    };

    match cli.format {
        OutputFormat::Json => emit_json(&result, cli.output.as_deref()),
        OutputFormat::Text => emit_text(&result, cli.output.as_deref()),
    }?;

    Ok(exit_code)
}

fn invocation(cli: &Cli, command: &str, args: Vec<String>, mode: ModeArg, jobs: usize, shared_cache: bool) -> Invocation {
    Invocation {
        command: command.to_string(),
        args,
        format: match cli.format {
            OutputFormat::Json => "json".to_string(),
            OutputFormat::Text => "text".to_string(),
        },
        mode: mode.mode().to_string(),
        jobs,
        shared_cache,
    }
}

fn execute_parse(cli: &Cli, args: &ParseArgs) -> Result<Execution> {
    if args.jobs == 0 {
        bail!("--jobs must be >= 1");
    }
    let mut paths = vec![args.grammar.clone()];
    paths.extend(args.tokens.iter().cloned());
    let mut execution = Execution {
        invocation: invocation(
            cli,
            "parse",
            paths.iter().map(|path| path.to_string_lossy().to_string()).collect(),
            args.prediction.mode,
            args.jobs,
            args.shared_cache,
        ),
        inputs: build_inputs(&paths),
        status: Status::Pass,
        reason: None,
        results: Vec::new(),
        profile: None,
    };

    let atn = match load_grammar(&args.grammar) {
        Ok(atn) => atn,
        Err(message) => return Ok(execution.failed(ReasonKind::InvalidGrammar, message)),
    };
    let Some(start_rule) = atn.rule_index(&args.start_rule) else {
        let message = format!("unknown start rule '{}'", args.start_rule);
        return Ok(execution.failed(ReasonKind::InvalidInput, message));
    };
    let predicates = predicate_table(&atn, &args.prediction)?;
    let mut inputs = Vec::with_capacity(args.tokens.len());
    for path in &args.tokens {
        match load_tokens(&atn, path) {
            Ok(symbols) => inputs.push(symbols),
            Err(message) => return Ok(execution.failed(ReasonKind::InvalidInput, message)),
        }
    }

    let options = BatchOptions {
        jobs: args.jobs,
        shared_cache: args.shared_cache,
        mode: args.prediction.mode.mode(),
        profile: args.profile.is_some(),
        predicates,
    };
    let batch = parse_batch(&atn, &inputs, start_rule, &options).context("build thread pool")?;

    let mut totals = (0..atn.number_of_decisions())
        .map(DecisionInfo::new)
        .collect::<Vec<_>>();
    for (path, item) in args.tokens.iter().zip(batch) {
        if let Some(infos) = &item.decision_info {
            for (total, info) in totals.iter_mut().zip(infos) {
                total.absorb(info);
            }
        }
        let diagnostics = args.prediction.diagnostics.then_some(item.diagnostics);
        let result = match item.outcome {
            Ok(outcome) => InputResult {
                path: path.to_string_lossy().to_string(),
                accepted: true,
                consumed: Some(outcome.consumed),
                prediction: None,
                predictions: outcome.predictions,
                error: None,
                diagnostics,
            },
            Err(err) => {
                execution.status = Status::Fail;
                InputResult {
                    path: path.to_string_lossy().to_string(),
                    accepted: false,
                    consumed: None,
                    prediction: None,
                    predictions: Vec::new(),
                    error: Some(syntax_error(&atn, &err)),
                    diagnostics,
                }
            }
        };
        execution.results.push(result);
    }

    if let Some(csv_path) = &args.profile {
        let file = File::create(csv_path).with_context(|| format!("create {}", csv_path.display()))?;
        report::write_csv(BufWriter::new(file), &atn, &totals)
            .with_context(|| format!("write {}", csv_path.display()))?;
        execution.profile = Some(ProfileSummary {
            csv: Some(csv_path.to_string_lossy().to_string()),
            parse_info: ParseInfo::from_decisions(&totals, None),
        });
    }
    Ok(execution)
}

fn execute_predict(cli: &Cli, args: &PredictArgs) -> Result<Execution> {
    let paths = vec![args.grammar.clone(), args.tokens.clone()];
    let mut execution = Execution {
        invocation: invocation(
            cli,
            "predict",
            paths.iter().map(|path| path.to_string_lossy().to_string()).collect(),
            args.prediction.mode,
            1,
            false,
        ),
        inputs: build_inputs(&paths),
        status: Status::Pass,
        reason: None,
        results: Vec::new(),
        profile: None,
    };

    let atn = match load_grammar(&args.grammar) {
        Ok(atn) => atn,
        Err(message) => return Ok(execution.failed(ReasonKind::InvalidGrammar, message)),
    };
    if args.decision >= atn.number_of_decisions() {
        let message = format!(
            "decision {} out of range; the network has {} decisions",
            args.decision,
            atn.number_of_decisions()
        );
        return Ok(execution.failed(ReasonKind::InvalidInput, message));
    }
    if let Some(state) = args.call_stack.iter().find(|&&state| !is_invoking_state(&atn, state)) {
        let message = format!("state {state} does not invoke a rule");
        return Ok(execution.failed(ReasonKind::InvalidInput, message));
    }
    let symbols = match load_tokens(&atn, &args.tokens) {
        Ok(symbols) => symbols,
        Err(message) => return Ok(execution.failed(ReasonKind::InvalidInput, message)),
    };

    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_mode(args.prediction.mode.mode());
    interpreter.set_predicates(predicate_table(&atn, &args.prediction)?);
    let call_context = CallContext::new(args.call_stack.clone(), args.precedence);
    let mut input = VecTokenStream::new(symbols);
    let outcome = interpreter.predict(&mut input, args.decision, &call_context);
    let diagnostics = args
        .prediction
        .diagnostics
        .then(|| interpreter.diagnostics().to_vec());

    let path = args.tokens.to_string_lossy().to_string();
    let result = match outcome {
        Ok(alt) => InputResult {
            path,
            accepted: true,
            consumed: None,
            prediction: Some(alt),
            predictions: Vec::new(),
            error: None,
            diagnostics,
        },
        Err(err) => {
            execution.status = Status::Fail;
            InputResult {
                path,
                accepted: false,
                consumed: None,
                prediction: None,
                predictions: Vec::new(),
                error: Some(syntax_error(&atn, &RecognitionError::from(err))),
                diagnostics,
            }
        }
    };
    execution.results.push(result);
    Ok(execution)
}

impl Execution {
    fn failed(mut self, kind: ReasonKind, message: String) -> Execution {
        log::warn!("{message}");
        self.status = Status::Error;
        self.reason = Some(Reason { kind, message });
        self
    }
}

fn is_invoking_state(atn: &Atn, state: usize) -> bool {
    state < atn.states().len()
        && matches!(
            atn.state(state).transitions.first(),
            Some(allstar_core::Transition::Rule { .. })
        )
}

fn load_grammar(path: &Path) -> Result<Arc<Atn>, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let grammar: GrammarSpec =
        serde_json::from_str(&text).map_err(|err| format!("{}: {err}", path.display()))?;
    let atn = grammar
        .compile()
        .map_err(|err| format!("{}: {err}", path.display()))?;
    Ok(Arc::new(atn))
}

fn load_tokens(atn: &Atn, path: &Path) -> Result<Vec<i32>, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    text.split_whitespace()
        .map(|name| {
            atn.token_type(name)
                .ok_or_else(|| format!("{}: unknown token '{name}'", path.display()))
        })
        .collect()
}

fn predicate_table(atn: &Atn, args: &PredictionArgs) -> Result<PredicateTable> {
    let mut table = PredicateTable::new();
    if let Some(value) = args.pred_default {
        table = table.with_default(value);
    }
    for pred in &args.preds {
        let (key, value) = pred
            .split_once('=')
            .with_context(|| format!("--pred {pred}: expected RULE:INDEX=BOOL"))?;
        let (rule, index) = key
            .split_once(':')
            .with_context(|| format!("--pred {pred}: expected RULE:INDEX=BOOL"))?;
        let Some(rule_index) = atn.rule_index(rule) else {
            bail!("--pred {pred}: unknown rule '{rule}'");
        };
        let index: usize = index
            .parse()
            .with_context(|| format!("--pred {pred}: bad predicate index"))?;
        let value: bool = value
            .parse()
            .with_context(|| format!("--pred {pred}: bad predicate value"))?;
        table.set(rule_index, index, value);
    }
    Ok(table)
}

fn syntax_error(atn: &Atn, err: &RecognitionError) -> SyntaxError {
    let kind = match err {
        RecognitionError::NoViableAlt(_) => "no_viable_alt",
        RecognitionError::InputMismatch { .. } => "input_mismatch",
        RecognitionError::FailedPredicate { .. } => "failed_predicate",
    };
    let message = match err {
        RecognitionError::NoViableAlt(inner) => format!(
            "no viable alternative at input '{}' in rule {}",
            atn.token_display_name(inner.offending_symbol),
            atn.rule_name_for_decision(inner.decision)
        ),
        RecognitionError::InputMismatch {
            symbol, expected, ..
        } => format!(
            "mismatched input '{}' expecting {}",
            atn.token_display_name(*symbol),
            atn.symbol_set_display(expected)
        ),
        other => other.to_string(),
    };
    SyntaxError {
        kind: kind.to_string(),
        message,
        offending_index: err.offending_index(),
    }
}

fn build_inputs(paths: &[PathBuf]) -> Vec<InputInfo> {
    paths
        .iter()
        .map(|path| InputInfo {
            path: path.to_string_lossy().to_string(),
            sha256: compute_sha256(path).unwrap_or_else(|_| "UNKNOWN".to_string()),
        })
        .collect()
}

fn compute_sha256(path: &Path) -> Result<String> {
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn emit_json(result: &ResultJson, output: Option<&Path>) -> Result<()> {
    let payload = serde_json::to_string_pretty(result).context("serialize result json")?;
    if let Some(path) = output {
        write_atomic(path, payload.as_bytes())?;
        return Ok(());
    }

    println!("{payload}");
    Ok(())
}

fn emit_text(result: &ResultJson, output: Option<&Path>) -> Result<()> {
    let mut lines = vec![format!(
        "status={} exit_code={}",
        status_label(result.status),
        result.exit_code
    )];
    if let Some(reason) = &result.reason {
        lines.push(format!("reason={}", reason.message));
    }
    for input in &result.results {
        let mut line = format!("input={} accepted={}", input.path, input.accepted);
        if let Some(consumed) = input.consumed {
            line.push_str(&format!(" consumed={consumed}"));
        }
        if let Some(alt) = input.prediction {
            line.push_str(&format!(" prediction={alt}"));
        }
        if let Some(error) = &input.error {
            line.push_str(&format!(" error=\"{}\" at={}", error.message, error.offending_index));
        }
        lines.push(line);
        for diagnostic in input.diagnostics.iter().flatten() {
            lines.push(format!("  {}", diagnostic.message()));
        }
    }
    let summary = lines.join("\n");
    if let Some(path) = output {
        write_atomic(path, summary.as_bytes())?;
        return Ok(());
    }
    println!("{summary}");
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("rename {}", path.display()))?;
    Ok(())
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pass => "pass",
        Status::Fail => "fail",
        Status::Error => "error",
    }
}
