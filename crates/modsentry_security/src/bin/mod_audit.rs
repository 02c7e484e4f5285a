//! # Mod Audit
//!
//! Command-line tool to compare a client mods directory against the
//! reference set, the same way the server would explain a mismatch.

use modsentry_core::{ArtifactFilter, DirectoryFingerprint};
use modsentry_security::config::{DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD};
use modsentry_security::{classify, recommends_punishment, SensitivityLevel};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         MODSENTRY MOD AUDIT                                      ║");
    println!("║         THE GATEKEEPER                                           ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        println!("Usage: mod_audit <reference_dir> <client_dir>");
        println!();
        println!("Options:");
        println!("  --low <n>      Differences up to n are LOW (default {DEFAULT_LOW_THRESHOLD})");
        println!("  --high <n>     Differences from n are HIGH (default {DEFAULT_HIGH_THRESHOLD})");
        println!("  --ext <ext>    Artifact extension (default jar)");
        println!("  --strict       Recommend punishment for LOW differences");
        println!("  --verbose      List every differing file");
        return ExitCode::from(2);
    }

    let option = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
    };
    let number = |name: &str, default: i64| {
        option(name)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or_else(|| usize::try_from(default).unwrap_or_default())
    };

    let low = number("--low", DEFAULT_LOW_THRESHOLD);
    let high = number("--high", DEFAULT_HIGH_THRESHOLD).max(low);
    let filter = option("--ext").map_or_else(ArtifactFilter::default, |e| ArtifactFilter::new(e));
    let strict = args.iter().any(|a| a == "--strict");
    let verbose = args.iter().any(|a| a == "--verbose");

    let Some(reference) = scan("Reference", Path::new(&args[1]), &filter) else {
        return ExitCode::FAILURE;
    };
    let Some(client) = scan("Client", Path::new(&args[2]), &filter) else {
        return ExitCode::FAILURE;
    };

    let report = classify(&client.files, &reference.files, low, high);
    let recommend = recommends_punishment(report.level, strict);

    println!();
    println!("┌─ SENSITIVITY ─────────────────────────────────────────────────┐");
    println!("│ Level:              {}", report.level);
    println!("│ Added:              {}", report.added.len());
    println!("│ Removed:            {}", report.removed.len());
    println!("│ Modified:           {}", report.modified.len());
    println!("│ Thresholds:         low={low} high={high}{}", if strict { " (strict)" } else { "" });

    if verbose && report.total_differences() > 0 {
        println!("│");
        for name in &report.added {
            println!("│  + {name}");
        }
        for name in &report.removed {
            println!("│  - {name}");
        }
        for name in &report.modified {
            println!("│  ~ {name}");
        }
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("{}", report.message());

    if report.level == SensitivityLevel::NoDifference {
        println!("✓ Client mods match the reference");
        ExitCode::SUCCESS
    } else {
        if recommend {
            println!("⚠ Punishment recommended");
        } else {
            println!("⚠ Mismatch - manual review recommended");
        }
        ExitCode::FAILURE
    }
}

fn scan(label: &str, dir: &Path, filter: &ArtifactFilter) -> Option<DirectoryFingerprint> {
    match DirectoryFingerprint::scan(dir, filter) {
        Ok(fp) => {
            println!("{label:<10} {} ({} files)", fp.digest, fp.files.len());
            Some(fp)
        }
        Err(e) => {
            println!("Error: {label} directory {}: {e}", dir.display());
            None
        }
    }
}
