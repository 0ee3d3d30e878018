mod loader;
mod logic;
mod util;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use detective_game::{DataLoader, EmbeddedLoader, MissionEngine};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use loader::DirectoryLoader;
use logic::{InvestigatorStrategy, MissionTester, ScenarioResult, resolve_seed_inputs};
use util::split_csv;

#[derive(Debug, Parser)]
#[command(name = "detective-tester", version = "0.1.0")]
#[command(about = "Automated QA for Supply Chain Detective missions - scripted investigators against the grading engine")]
struct Args {
    /// Missions to run (comma-separated ids, or `all`)
    #[arg(long, default_value = "all")]
    missions: String,

    /// List all available missions and exit
    #[arg(long)]
    list_missions: bool,

    /// Investigator policies to run (comma-separated, or `all`)
    #[arg(long, default_value = "all")]
    policies: String,

    /// Scorer seeds to run (comma-separated)
    #[arg(long, default_value = "42")]
    seeds: String,

    /// Number of iterations per mission and policy
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Skip the load-twice determinism check
    #[arg(long)]
    skip_determinism: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Read missions.json, engine.json and datasets/ from this directory
    /// instead of the bundled assets
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let passed = match args.data_dir.clone() {
        Some(dir) => run(&args, DirectoryLoader::new(dir)).await?,
        None => run(&args, EmbeddedLoader::new()).await?,
    };

    if !passed {
        std::process::exit(1);
    }

    Ok(())
}

async fn run<L>(args: &Args, loader: L) -> Result<bool>
where
    L: DataLoader + Clone,
{
    let engine = MissionEngine::new(loader.clone()).context("failed to load mission catalog")?;

    if args.list_missions {
        list_missions(args, &engine)?;
        return Ok(true);
    }

    announce_banner();

    let start_time = Instant::now();
    let missions = expand_missions(&args.missions, &engine)?;
    let strategies = expand_policies(&args.policies)?;
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;
    let tester = MissionTester::new(loader, engine.config().clone(), args.verbose);

    let mut results: Vec<ScenarioResult> = Vec::new();
    for mission_id in &missions {
        println!("{} {}", "🔎 Mission".bright_yellow().bold(), mission_id.bold());
        if !args.skip_determinism {
            results.extend(tester.check_determinism(mission_id, &seeds).await);
        }
        for &strategy in &strategies {
            results.extend(
                tester
                    .run_scenario(mission_id, strategy, &seeds, args.iterations)
                    .await,
            );
        }
    }

    write_reports(args, &results, start_time)?;
    Ok(results.iter().all(|r| r.passed))
}

fn list_missions<L: DataLoader>(args: &Args, engine: &MissionEngine<L>) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available missions:")?;
    for summary in engine.catalog().list() {
        writeln!(
            output_target.writer(),
            "  {:20} - {} ({:?}, {} hints, dataset {})",
            summary.mission_id,
            summary.title,
            summary.difficulty,
            summary.hint_count,
            summary.dataset
        )?;
    }
    output_target.flush_inner()?;
    Ok(())
}

fn announce_banner() {
    println!("{}", "🕵️ Supply Chain Detective Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn expand_missions<L: DataLoader>(missions_arg: &str, engine: &MissionEngine<L>) -> Result<Vec<String>> {
    let mut missions = split_csv(missions_arg);
    if missions.iter().any(|m| m.eq_ignore_ascii_case("all")) {
        missions.retain(|m| !m.eq_ignore_ascii_case("all"));
        for summary in engine.catalog().list() {
            if !missions.contains(&summary.mission_id) {
                missions.push(summary.mission_id);
            }
        }
    }
    if missions.is_empty() {
        bail!("no missions selected");
    }
    Ok(missions)
}

fn expand_policies(policies_arg: &str) -> Result<Vec<InvestigatorStrategy>> {
    let mut strategies = Vec::new();
    for token in split_csv(policies_arg) {
        if token.eq_ignore_ascii_case("all") {
            for strategy in InvestigatorStrategy::ALL {
                if !strategies.contains(&strategy) {
                    strategies.push(strategy);
                }
            }
            continue;
        }
        let Some(strategy) = InvestigatorStrategy::parse(&token) else {
            let known: Vec<&str> = InvestigatorStrategy::ALL.iter().map(|s| s.key()).collect();
            bail!("unknown policy '{token}' (expected one of {})", known.join(", "));
        };
        if !strategies.contains(&strategy) {
            strategies.push(strategy);
        }
    }
    Ok(strategies)
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                logic::reports::generate_json_report(&mut output_target, results)?;
            }
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Supply Chain Detective Mission Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No mission scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(&mut output_target, results, duration)?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            missions: "all".to_string(),
            list_missions: false,
            policies: "all".to_string(),
            seeds: "42".to_string(),
            iterations: 1,
            skip_determinism: false,
            report: "json".to_string(),
            data_dir: None,
            verbose: false,
            output: None,
        }
    }

    fn engine() -> MissionEngine<EmbeddedLoader> {
        MissionEngine::new(EmbeddedLoader::new()).unwrap()
    }

    #[test]
    fn expand_missions_handles_all_and_explicit_ids() {
        let engine = engine();
        assert_eq!(
            expand_missions("all", &engine).unwrap(),
            vec!["acme-backorders", "wh04-overload", "i80-gridlock"]
        );
        assert_eq!(
            expand_missions("i80-gridlock,all", &engine).unwrap(),
            vec!["i80-gridlock", "acme-backorders", "wh04-overload"]
        );
        assert!(expand_missions(" , ", &engine).is_err());
    }

    #[test]
    fn expand_policies_dedupes_and_rejects_unknown() {
        assert_eq!(
            expand_policies("sleuth,all").unwrap().len(),
            InvestigatorStrategy::ALL.len()
        );
        assert_eq!(
            expand_policies("near-miss,near-miss").unwrap(),
            vec![InvestigatorStrategy::NearMiss]
        );
        let err = expand_policies("psychic").unwrap_err();
        assert!(err.to_string().contains("psychic"));
    }

    #[test]
    fn write_reports_to_file_as_json() {
        let path = std::env::temp_dir().join(format!(
            "detective-report-{}.json",
            std::process::id()
        ));
        let mut args = base_args();
        args.output = Some(path.clone());
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[tokio::test]
    async fn run_reports_pass_for_bundled_missions() {
        let path = std::env::temp_dir().join(format!(
            "detective-run-{}.json",
            std::process::id()
        ));
        let mut args = base_args();
        args.missions = "acme-backorders".to_string();
        args.output = Some(path.clone());
        assert!(run(&args, EmbeddedLoader::new()).await.unwrap());
        let parsed: Vec<ScenarioResult> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        // one determinism check plus one result per policy
        assert_eq!(parsed.len(), 1 + InvestigatorStrategy::ALL.len());
    }

    #[test]
    fn output_target_writes_to_stdout() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
