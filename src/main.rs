// anacrypt: a solver for dinocomics 1663-style cryptoanagrams.
//
// Subcommands:
//   solve       — run the search loop until a solution is recorded
//   candidates  — inspect (and optionally trim) a node of the tree
//   check       — validate and score a sentence prefix by prefix
//   prune       — exclude every stored sentence containing given words
//
// Exit codes: 0 success, 1 usage or configuration error, 2 search
// exhausted (or budget spent) without a solution.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use anacrypt::{
    candidates_report, check_sentence, prune_word, CheckRow, Fragment, FrequencyOracle,
    NodeRecord, NodeStatus, Oracle, Puzzle, SearchTree, SolveOutcome, Solver, SolverConfig,
    Vocabulary,
};

const DB_ENV: &str = "ANACRYPT_DB";
const ORACLE_ENV: &str = "ANACRYPT_ORACLE";
const DEFAULT_DB: &str = "anacrypt.db";

#[derive(Parser)]
#[command(name = "anacrypt", version)]
#[command(about = "a solver for dinocomics 1663-style cryptoanagrams")]
struct Cli {
    /// Path to the persistent search tree (default: $ANACRYPT_DB, then anacrypt.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Newline-separated vocabulary file
    #[arg(long, global = true, default_value = "vocabulary.txt")]
    vocab: PathBuf,

    /// Oracle frequency data, JSON (default: $ANACRYPT_ORACLE)
    #[arg(long, global = true)]
    oracle: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the search loop until a solution is recorded
    Solve {
        /// The letter bank to arrange (omit with --c1663)
        letters: Option<String>,
        /// Apply the comic 1663 puzzle profile
        #[arg(long, conflicts_with = "letters")]
        c1663: bool,
        /// PRNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Stop after this many iterations
        #[arg(long)]
        max_iterations: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        max_time: Option<u64>,
        /// Selection softmax sharpness
        #[arg(long, default_value_t = 0.1)]
        temperature: f64,
    },
    /// Show child demographics and the best candidates under a prefix
    Candidates {
        prefix: String,
        /// The letter bank of the puzzle (omit with --c1663)
        #[arg(long, conflicts_with = "c1663")]
        letters: Option<String>,
        #[arg(long)]
        c1663: bool,
        /// How many children / descendants to list
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Delete all descendants of the prefix
        #[arg(long)]
        trim: bool,
        /// Override the node's status (0 open, 1 invalid, 7 excluded)
        #[arg(long)]
        status: Option<i64>,
    },
    /// Validate and score a sentence, prefix by prefix
    Check {
        sentence: String,
        /// The letter bank of the puzzle (omit with --c1663)
        #[arg(long, conflicts_with = "c1663")]
        letters: Option<String>,
        #[arg(long)]
        c1663: bool,
        /// Validate only the full sentence, as a completion candidate
        #[arg(long)]
        candidate_only: bool,
        /// Emit a JSON array of [sentence, c1, c2, c3, c4, score, status]
        #[arg(long)]
        json: bool,
    },
    /// Exclude every stored sentence containing the given words
    Prune {
        #[arg(required = true)]
        words: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // clap's own usage-error exit code is 2, which this tool reserves
    // for search exhaustion
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let db_path = cli
        .db
        .clone()
        .or_else(|| std::env::var_os(DB_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

    match cli.command {
        Cmd::Solve {
            ref letters,
            c1663,
            seed,
            max_iterations,
            max_time,
            temperature,
        } => {
            let puzzle = load_puzzle(&cli, c1663, letters.as_deref())?;
            let oracle = load_oracle(&cli)?;
            let tree = SearchTree::open(&db_path)
                .with_context(|| format!("opening store {}", db_path.display()))?;
            let config = SolverConfig {
                seed,
                temperature,
                max_iterations,
                max_time: max_time.map(Duration::from_secs),
            };
            info!(
                "solving over {} letters with {} words (store: {})",
                puzzle.bank.size(),
                puzzle.vocabulary.len(),
                db_path.display()
            );
            let mut solver = Solver::new(puzzle, tree, oracle, config);
            match solver.solve()? {
                SolveOutcome::Solved(sentence) => {
                    println!("{sentence}");
                    Ok(ExitCode::SUCCESS)
                }
                SolveOutcome::Exhausted | SolveOutcome::Stopped => Ok(ExitCode::from(2)),
            }
        }

        Cmd::Candidates {
            ref prefix,
            ref letters,
            c1663,
            limit,
            trim,
            status,
        } => {
            let puzzle = load_puzzle(&cli, c1663, letters.as_deref())?;
            let mut tree = SearchTree::open(&db_path)
                .with_context(|| format!("opening store {}", db_path.display()))?;
            let prefix = Fragment::new(prefix).sentence;

            let new_status = match status {
                Some(code) => Some(
                    NodeStatus::from_code(code)
                        .with_context(|| format!("unknown status code {code}"))?,
                ),
                None => None,
            };
            if trim {
                let (modified, deleted) = tree.trim(&prefix, new_status)?;
                println!("trimmed {prefix:?}: {modified} modified, {deleted} deleted");
            } else if let Some(status) = new_status {
                if let Some(mut node) = tree.get(&prefix)? {
                    node.status = status;
                    tree.put(&node)?;
                    println!("status of {prefix:?} set to {}", status.code());
                } else {
                    println!("{prefix:?} is not stored");
                }
            }

            let report = candidates_report(&puzzle, &tree, &prefix, limit)?;
            match &report.node {
                Some(node) => println!("{}", describe(node)),
                None => println!("(unexplored) {prefix}"),
            }
            let demographics: Vec<String> = report
                .demographics
                .iter()
                .map(|(status, count)| format!("{status}: {count}"))
                .collect();
            println!("children by status: {{{}}}", demographics.join(", "));
            if !report.top_children.is_empty() {
                println!("top children by score:");
                for child in &report.top_children {
                    println!("  {}", describe(child));
                }
            }
            if !report.top_descendants.is_empty() {
                println!("top descendants by mean:");
                for descendant in &report.top_descendants {
                    println!("  {}", describe(descendant));
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Cmd::Check {
            ref sentence,
            ref letters,
            c1663,
            candidate_only,
            json,
        } => {
            let puzzle = load_puzzle(&cli, c1663, letters.as_deref())?;
            let oracle = load_oracle(&cli)?;
            let rows = check_sentence(&puzzle, oracle.as_ref(), sentence, candidate_only)?;
            if json {
                println!("{}", render_json(&rows));
            } else {
                for row in &rows {
                    println!("{} {} {}", row.status, fmt_score(row.score), row.sentence);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Cmd::Prune { ref words } => {
            let mut tree = SearchTree::open(&db_path)
                .with_context(|| format!("opening store {}", db_path.display()))?;
            for word in words {
                let (modified, deleted) = prune_word(&mut tree, word)?;
                println!("pruned {word:?}: {modified} excluded, {deleted} deleted");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_puzzle(cli: &Cli, c1663: bool, letters: Option<&str>) -> anyhow::Result<Puzzle> {
    let vocabulary = Vocabulary::from_file(&cli.vocab)
        .with_context(|| format!("loading vocabulary {}", cli.vocab.display()))?;
    info!("loaded vocab ({} items)", vocabulary.len());
    if c1663 {
        info!("using special constraints for comic 1663");
        return Ok(Puzzle::c1663(vocabulary));
    }
    let letters =
        letters.ok_or_else(|| anyhow::anyhow!("a letter bank is required without --c1663"))?;
    Ok(Puzzle::unconstrained(letters, vocabulary))
}

fn load_oracle(cli: &Cli) -> anyhow::Result<Box<dyn Oracle>> {
    let path = cli
        .oracle
        .clone()
        .or_else(|| std::env::var_os(ORACLE_ENV).map(PathBuf::from))
        .ok_or_else(|| {
            anyhow::anyhow!("no oracle configured: pass --oracle or set ${ORACLE_ENV}")
        })?;
    let oracle = FrequencyOracle::from_file(&path)
        .with_context(|| format!("loading oracle data {}", path.display()))?;
    Ok(Box::new(oracle))
}

fn describe(node: &NodeRecord) -> String {
    format!(
        "[{}] score {} mean {} visits {} | {}",
        node.status.code(),
        node.score.map_or("-".to_string(), fmt_score),
        node.mean_descendant.map_or("-".to_string(), fmt_score),
        node.visits,
        if node.sentence.is_empty() {
            "(root)"
        } else {
            node.sentence.as_str()
        }
    )
}

/// Infinite scores render as bare `Infinity`/`-Infinity` tokens, not as
/// strings or null.
fn fmt_score(score: f64) -> String {
    if score == f64::INFINITY {
        "Infinity".to_string()
    } else if score == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{score:.4}")
    }
}

fn render_json(rows: &[CheckRow]) -> String {
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            format!(
                "[{}, {}, {}, {}, {}, {}, {}]",
                serde_json::to_string(&row.sentence).unwrap_or_else(|_| "\"\"".to_string()),
                row.flags[0],
                row.flags[1],
                row.flags[2],
                row.flags[3],
                fmt_score(row.score),
                row.status
            )
        })
        .collect();
    format!("[{}]", tuples.join(", "))
}
