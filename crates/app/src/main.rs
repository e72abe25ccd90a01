use std::fmt;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use quiz_core::model::{Letter, ModuleId, QuestionCount, QuizSettings, SessionKey};
use services::{Clock, Completion, NextOutcome, QuizEngine, RandomSource, ServedQuestion};
use storage::json_bank::JsonFileBankSource;
use storage::repository::{BankSource, Storage};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingModule,
    InvalidModule { raw: String },
    InvalidCount { raw: String },
    InvalidSeed { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingModule => write!(f, "--module is required unless --weighted is set"),
            ArgsError::InvalidModule { raw } => write!(f, "invalid --module value: {raw:?}"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Module(ModuleId),
    Weighted,
}

struct Args {
    banks: PathBuf,
    target: Target,
    count: Option<QuestionCount>,
    db: Option<SessionDb>,
    config: Option<PathBuf>,
    seed: Option<u64>,
    json: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quiz --module <id> [--count <n|full>] [--banks <dir>] [--db <sqlite_url>]");
    eprintln!("  quiz --weighted    [--count <n>]      [--banks <dir>] [--config <path>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>  JSON settings (default count, weights, catalog)");
    eprintln!("  --seed <u64>     fixed randomness for reproducible draws");
    eprintln!("  --json           print questions and results as JSON lines");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --banks banks");
    eprintln!("  sessions kept in memory unless --db is given");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_BANK_DIR, QUIZ_DB_URL, QUIZ_CONFIG, QUIZ_LOG");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut banks = std::env::var("QUIZ_BANK_DIR")
            .ok()
            .map_or_else(|| PathBuf::from("banks"), PathBuf::from);
        let mut db = std::env::var("QUIZ_DB_URL")
            .ok()
            .map(|raw| SessionDb::parse(&raw))
            .transpose()?;
        let mut config = std::env::var("QUIZ_CONFIG").ok().map(PathBuf::from);
        let mut module = None;
        let mut weighted = false;
        let mut count = None;
        let mut seed = None;
        let mut json = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--banks" => banks = PathBuf::from(require_value(args, "--banks")?),
                "--module" => {
                    let value = require_value(args, "--module")?;
                    let parsed = ModuleId::new(value.clone())
                        .map_err(|_| ArgsError::InvalidModule { raw: value })?;
                    module = Some(parsed);
                }
                "--weighted" => weighted = true,
                "--count" => {
                    let value = require_value(args, "--count")?;
                    let parsed: QuestionCount = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCount { raw: value.clone() })?;
                    count = Some(parsed);
                }
                "--db" => {
                    db = Some(SessionDb::parse(&require_value(args, "--db")?)?);
                }
                "--config" => config = Some(PathBuf::from(require_value(args, "--config")?)),
                "--seed" => {
                    let value = require_value(args, "--seed")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSeed { raw: value.clone() })?;
                    seed = Some(parsed);
                }
                "--json" => json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let target = match (weighted, module) {
            (true, _) => Target::Weighted,
            (false, Some(module)) => Target::Module(module),
            (false, None) => return Err(ArgsError::MissingModule),
        };

        Ok(Self {
            banks,
            target,
            count,
            db,
            config,
            seed,
            json,
        })
    }
}

/// Where sessions are persisted when `--db` is given.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionDb {
    Memory,
    File(PathBuf),
}

impl SessionDb {
    /// Accepts `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>` or a bare path.
    /// Relative paths resolve against the working directory.
    fn parse(raw: &str) -> Result<Self, ArgsError> {
        let value = raw.trim();
        if matches!(value, "sqlite::memory:" | ":memory:") {
            return Ok(Self::Memory);
        }
        let path = value
            .strip_prefix("sqlite://")
            .or_else(|| value.strip_prefix("sqlite:"))
            .unwrap_or(value);
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        if path.is_empty() {
            return Err(ArgsError::InvalidDbUrl {
                raw: raw.to_string(),
            });
        }

        let path = PathBuf::from(path);
        if path.is_absolute() {
            return Ok(Self::File(path));
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Ok(Self::File(cwd.join(path)))
    }

    fn url(&self) -> String {
        match self {
            Self::Memory => "sqlite::memory:".to_string(),
            Self::File(path) => format!("sqlite://{}", path.display()),
        }
    }

    /// sqlx will not create a missing database file, so make sure one exists.
    fn ensure_file(&self) -> std::io::Result<()> {
        let Self::File(path) = self else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(drop)
    }
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("QUIZ_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))?;
    Ok(())
}

fn load_settings(path: Option<&PathBuf>) -> Result<QuizSettings, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(QuizSettings::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    let settings = QuizSettings::from_json(&text)?;
    tracing::debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

/// Parse a typed selection such as `B`, `a c`, or `A,C`.
fn parse_selection(line: &str) -> Option<Vec<Letter>> {
    let mut letters = Vec::new();
    for c in line.chars().filter(|c| c.is_ascii_alphanumeric()) {
        let letter = Letter::from_char(c)?;
        if !letters.contains(&letter) {
            letters.push(letter);
        }
    }
    (!letters.is_empty()).then_some(letters)
}

fn print_question(out: &mut impl Write, q: &ServedQuestion, json: bool) -> std::io::Result<()> {
    if json {
        return writeln!(out, "{}", serde_json::to_string(q).map_err(std::io::Error::other)?);
    }
    writeln!(out)?;
    writeln!(out, "#{} {}", q.served_count, q.stem)?;
    for option in &q.options {
        writeln!(out, "  {}. {}", option.letter, option.text)?;
    }
    if q.is_multi_select {
        write!(out, "Select all that apply> ")?;
    } else {
        write!(out, "Answer> ")?;
    }
    out.flush()
}

fn print_completion(out: &mut impl Write, done: &Completion, json: bool) -> std::io::Result<()> {
    if json {
        return writeln!(
            out,
            "{}",
            serde_json::to_string(done).map_err(std::io::Error::other)?
        );
    }
    writeln!(out)?;
    writeln!(
        out,
        "First try: {}/{} ({}%), {} questions served",
        done.first_try_correct, done.first_try_total, done.first_try_pct, done.served_count
    )?;
    for item in &done.review {
        let letters: String = item.correct_letters.iter().map(|l| l.as_char()).collect();
        writeln!(out, "  [{letters}] {}", item.stem)?;
    }
    out.flush()
}

async fn run_quiz(
    engine: &QuizEngine,
    key: SessionKey,
    json: bool,
) -> Result<Option<Completion>, Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut out = std::io::stdout();

    loop {
        let question = match engine.next_question(key).await? {
            NextOutcome::Question(q) => q,
            NextOutcome::Done(done) => {
                print_completion(&mut out, &done, json)?;
                return Ok(Some(done));
            }
        };
        print_question(&mut out, &question, json)?;

        let selected = loop {
            let Some(line) = lines.next().transpose()? else {
                engine.reset_session(key).await?;
                return Ok(None);
            };
            if line.trim().eq_ignore_ascii_case("q") {
                engine.reset_session(key).await?;
                return Ok(None);
            }
            match parse_selection(&line) {
                Some(letters) => break letters,
                None => {
                    write!(out, "Letters A-H please> ")?;
                    out.flush()?;
                }
            }
        };

        let feedback = engine.submit_answer(key, &question.id, &selected).await?;
        if json {
            writeln!(out, "{}", serde_json::to_string(&feedback)?)?;
        } else if feedback.correct {
            writeln!(out, "Correct.")?;
        } else {
            let letters: String = feedback.correct_letters.iter().map(|l| l.as_char()).collect();
            writeln!(out, "Not quite: {letters}. It will come back.")?;
            if !feedback.rationale.is_empty() {
                writeln!(out, "  {}", feedback.rationale)?;
            }
        }
    }
}

fn confirm(prompt: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut out = std::io::stdout();
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing()?;
    let settings = load_settings(parsed.config.as_ref())?;
    let banks: Arc<dyn BankSource> = Arc::new(JsonFileBankSource::new(&parsed.banks));

    // Sessions only outlive the process when a database is given.
    let engine = match &parsed.db {
        Some(db) => {
            db.ensure_file()?;
            QuizEngine::sqlite(&db.url(), banks, settings).await?
        }
        None => QuizEngine::new(Storage::in_memory(banks), settings),
    };
    let random = parsed.seed.map_or(RandomSource::Os, RandomSource::seeded);
    let engine = engine
        .with_clock(Clock::default_clock())
        .with_random(random);

    let key = SessionKey::generate();
    let total = match &parsed.target {
        Target::Module(module) => engine.start_session(key, module, parsed.count).await?,
        Target::Weighted => {
            let requested = match parsed.count {
                Some(QuestionCount::Exact(n)) => usize::try_from(n.max(1)).unwrap_or(1),
                Some(QuestionCount::All) | None => {
                    usize::try_from(engine.settings().default_count).unwrap_or(1)
                }
            };
            engine.start_weighted_session(key, requested).await?
        }
    };
    if !parsed.json {
        println!("{total} questions. Type letters to answer, q to quit.");
    }

    let mut finished = run_quiz(&engine, key, parsed.json).await?;
    while let Some(done) = finished.take() {
        if done.missed.is_empty() || parsed.json {
            break;
        }
        if !confirm(&format!("Retry the {} missed question(s)?", done.missed.len()))? {
            break;
        }
        engine.start_missed(key).await?;
        finished = run_quiz(&engine, key, parsed.json).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
