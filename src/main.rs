use anyhow::Result;
use bundle_replace::{
    load_replacer, ArtifactStore, BuildHost, DirStore, InvocationPoint, ModuleKind, Overrides,
    PassReport, Phase, Replacer, SourceModule, StoreError, TargetOutcome,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "bundle-replace")]
#[command(about = "Regex replacement over bundler output with source map support", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply replacement rules to an output directory
    Apply {
        /// Replacement config (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory to rewrite
        #[arg(long)]
        dir: PathBuf,

        /// Invocation point, overriding the config
        #[arg(short, long)]
        target: Option<String>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Leave source maps alone
        #[arg(long)]
        no_source_map: bool,
    },

    /// Validate a config and list its rules
    Check {
        /// Replacement config (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Apply {
            config,
            dir,
            target,
            dry_run,
            diff,
            no_source_map,
        } => cmd_apply(&config, &dir, target, dry_run, diff, no_source_map),

        Commands::Check { config } => cmd_check(&config),
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(name: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", name).dimmed());
    println!("{}", format!("+++ {} (replaced)", name).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Every file of the output directory as a module, for module-source runs.
fn modules_from_store(store: &DirStore) -> Result<Vec<ModuleKind>> {
    let mut modules = Vec::new();
    for name in store.names() {
        match store.get(&name) {
            Ok(Some(artifact)) => {
                modules.push(ModuleKind::Simple(SourceModule::new(name, artifact)));
            }
            Ok(None) => {}
            Err(StoreError::NotUtf8 { .. }) => modules.push(ModuleKind::Unknown {
                identifier: name,
                kind: "binary".to_string(),
            }),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(modules)
}

fn run_replacer(replacer: Rc<Replacer>, store: DirStore) -> Result<(Vec<PassReport>, DirStore)> {
    let module_run = replacer.options().target == InvocationPoint::ModuleSource;
    let modules = if module_run {
        modules_from_store(&store)?
    } else {
        Vec::new()
    };

    let mut host = BuildHost::new(store).with_modules(modules);
    replacer.apply(&mut host);
    let reports = host.run()?;
    let mut context = host.into_context();

    // Rewritten module sources land back in the files they came from.
    if module_run {
        for module in &mut context.modules {
            for source in module.sources_mut() {
                let rewritten = reports
                    .iter()
                    .flat_map(|r| &r.outcomes)
                    .filter(|o| matches!(o, TargetOutcome::Rewritten { .. }))
                    .any(|o| o.target() == source.identifier());
                if rewritten {
                    context
                        .assets
                        .set(source.identifier(), source.source().clone())?;
                }
            }
        }
    }

    Ok((reports, context.assets))
}

fn cmd_apply(
    config_path: &Path,
    dir: &Path,
    target: Option<String>,
    dry_run: bool,
    show_diff: bool,
    no_source_map: bool,
) -> Result<()> {
    // 1. Load config with command line overrides
    let overrides = Overrides {
        target,
        source_map: no_source_map.then_some(false),
    };
    let replacer = Rc::new(load_replacer(config_path, &overrides)?);

    // 2. Open the output directory
    let mut store = DirStore::open(dir)?;
    if !replacer.options().source_map {
        store = store.without_source_maps();
    }
    if dry_run {
        store = store.dry_run();
    }

    println!("Output: {}", dir.display());
    println!(
        "Target: {} ({} patterns)",
        replacer.options().target,
        replacer.patterns().len()
    );
    if dry_run {
        println!("{}", "  [DRY RUN - showing what would be replaced]".cyan());
    }
    println!();

    // Capture file contents before replacing (for diff output)
    let mut before: BTreeMap<String, String> = BTreeMap::new();
    if show_diff {
        for name in store.names() {
            if let Ok(Some(artifact)) = store.get(&name) {
                before.insert(name, artifact.text);
            }
        }
    }

    // 3. Run the build lifecycle
    let (reports, store) = run_replacer(replacer, store)?;

    // 4. Report results
    let mut total_rewritten = 0;
    let mut total_unmatched = 0;
    let mut total_skipped = 0;
    let mut total_failed = 0;

    for report in reports.iter().filter(|r| r.phase != Phase::BuildModule) {
        for outcome in &report.outcomes {
            match outcome {
                TargetOutcome::Rewritten {
                    target,
                    replacements,
                } => {
                    let verb = if dry_run { "Would replace" } else { "Replaced" };
                    println!(
                        "{} {}: {} {} matches",
                        "✓".green(),
                        target,
                        verb,
                        replacements
                    );
                    total_rewritten += 1;

                    if show_diff {
                        if let (Some(original), Ok(Some(after))) =
                            (before.get(target), store.get(target))
                        {
                            if original != &after.text {
                                display_diff(target, original, &after.text);
                            }
                        }
                    }
                }
                TargetOutcome::Unmatched { target } => {
                    log::debug!("{}: no matches", target);
                    total_unmatched += 1;
                }
                TargetOutcome::Skipped { target, reason } => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), target, reason);
                    total_skipped += 1;
                }
                TargetOutcome::Failed { target, error } => {
                    eprintln!("{} {}: Failed - {}", "✗".red(), target, error);
                    total_failed += 1;
                }
            }
        }
    }

    // 5. Summary
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} rewritten", format!("{}", total_rewritten).green());
    println!("  {} unmatched", format!("{}", total_unmatched).yellow());
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(config_path: &Path) -> Result<()> {
    let replacer = load_replacer(config_path, &Overrides::default())?;
    let options = replacer.options();

    println!("{} {}", "✓".green(), config_path.display());
    println!(
        "  target: {} (runs at {})",
        options.target,
        options.target.phase()
    );
    println!(
        "  source maps: {}",
        if options.source_map { "on" } else { "off" }
    );
    if !replacer.filter().is_empty() {
        println!("  asset filter: on");
    }
    if replacer.patterns().is_empty() {
        println!("  {}", "no patterns; nothing will be replaced".yellow());
    }
    println!();

    for (idx, pattern) in replacer.patterns().iter().enumerate() {
        let mut scope = Vec::new();
        if let Some(re) = &pattern.target_filename_pattern {
            scope.push(format!("files matching {}", re.as_str()));
        }
        if let Some(suffix) = &pattern.target_suffix {
            scope.push(format!("files ending in {}", suffix));
        }
        let scope = if scope.is_empty() {
            "all files".to_string()
        } else {
            scope.join(" or ")
        };
        let occurrences = if pattern.global { "every" } else { "first" };

        println!(
            "  {}. {} ({} occurrence, {})",
            idx + 1,
            pattern.label().bold(),
            occurrences,
            scope.dimmed()
        );
    }

    Ok(())
}
