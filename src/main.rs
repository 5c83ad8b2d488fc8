use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};

use releve_lib::compare::{
    bucketed, compare, CompareMode, CompareRequest, ComparisonRow, MonthSpan, PeriodSlot, Snapshot,
};
use releve_lib::db::health::{run_health_checks, DbHealthReport, DbHealthStatus};
use releve_lib::db::{
    Database, DB_UNHEALTHY_CLI_HINT, DB_UNHEALTHY_CODE, DB_UNHEALTHY_EXIT_CODE,
};
use releve_lib::graph::{build_chart, GraphRequest, SeriesKind, SeriesOverrides};
use releve_lib::hierarchy::path_depth;
use releve_lib::report::{cell, export_rows, SortColumn, EXPORT_HEADERS};
use releve_lib::aggregate::Filters;

#[derive(Debug, Parser)]
#[command(name = "releve", about = "Meter-reading tracker and period comparison", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance and inspection commands.
    #[command(subcommand)]
    Db(DbCommand),
    /// Compare readings between two periods and print the report rows.
    Compare {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Emit rows as JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
    /// Build the chart model for a comparison and print it as JSON.
    Graph {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Draw value labels on the chart.
        #[arg(long)]
        labels: bool,
        /// Render one series as a line instead of a bar, as CATEGORY@1 or
        /// CATEGORY@2. May be repeated.
        #[arg(long = "line", value_name = "CATEGORY@1|2")]
        lines: Vec<String>,
    },
    /// Write the comparison as a semicolon-delimited file.
    Export {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Target file; defaults to a timestamped name in the current
        /// directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Run the SQLite health checks and report their status.
    Status {
        /// Emit the raw JSON health report instead of the table view.
        #[arg(long)]
        json: bool,
    },
    /// Run VACUUM to compact the database when it is healthy.
    Vacuum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Monthly,
    Cumulative,
}

impl From<ModeArg> for CompareMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Monthly => CompareMode::Monthly,
            ModeArg::Cumulative => CompareMode::Cumulative,
        }
    }
}

#[derive(Debug, Args)]
struct SelectionArgs {
    /// First period, inclusive, as YYYY-MM:YYYY-MM.
    #[arg(long, value_name = "YYYY-MM:YYYY-MM")]
    period1: String,
    /// Second period, inclusive, as YYYY-MM:YYYY-MM.
    #[arg(long, value_name = "YYYY-MM:YYYY-MM")]
    period2: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Monthly)]
    mode: ModeArg,
    /// Display level 1-5. Levels 1-4 keep categories at that exact depth;
    /// level 5 keeps everything.
    #[arg(long, default_value_t = 5)]
    level: u8,
    /// Keep only meters whose name contains this text (case-insensitive).
    #[arg(long)]
    filter_meter: Option<String>,
    /// Keep only category paths containing this text (case-insensitive).
    #[arg(long)]
    filter_category: Option<String>,
    /// Keep only parameters whose name contains this text (case-insensitive).
    #[arg(long)]
    filter_parameter: Option<String>,
}

impl SelectionArgs {
    fn request(&self) -> Result<CompareRequest> {
        let period1 = MonthSpan::parse(&self.period1)
            .with_context(|| format!("parse --period1 {}", self.period1))?;
        let period2 = MonthSpan::parse(&self.period2)
            .with_context(|| format!("parse --period2 {}", self.period2))?;
        if !(1..=5).contains(&self.level) {
            anyhow::bail!("--level must be between 1 and 5, got {}", self.level);
        }
        Ok(CompareRequest {
            period1,
            period2,
            mode: self.mode.into(),
            filters: Filters {
                meter: self.filter_meter.clone(),
                category: self.filter_category.clone(),
                parameter: self.filter_parameter.clone(),
            },
        })
    }
}

fn main() {
    releve_lib::init_logging();

    let cli = Cli::parse();
    match handle_cli(cli.command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn handle_cli(command: Commands) -> Result<i32> {
    match command {
        Commands::Db(db) => handle_db_command(db),
        Commands::Compare { selection, json } => handle_compare(&selection, json),
        Commands::Graph {
            selection,
            labels,
            lines,
        } => handle_graph(&selection, labels, &lines),
        Commands::Export { selection, out } => handle_export(&selection, out),
    }
}

fn open_database() -> Result<Database> {
    let db_path = default_db_path().context("determine database path")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("open database at {}", db_path.display()))?;
    db.migrate().context("apply schema migrations")?;
    Ok(db)
}

fn handle_db_command(command: DbCommand) -> Result<i32> {
    match command {
        DbCommand::Status { json } => {
            let db = open_database()?;
            let report = run_health_checks(&db).context("run database health checks")?;
            if json {
                print_report_json(&report)?;
            } else {
                print_report_table(&report);
            }
            Ok(match report.status {
                DbHealthStatus::Ok => 0,
                DbHealthStatus::Error => 1,
            })
        }
        DbCommand::Vacuum => {
            let db = open_database()?;
            let report = run_health_checks(&db).context("run database health checks")?;
            if !matches!(report.status, DbHealthStatus::Ok) {
                eprintln!("Error: {DB_UNHEALTHY_CODE}. {DB_UNHEALTHY_CLI_HINT}");
                return Ok(DB_UNHEALTHY_EXIT_CODE);
            }
            db.vacuum().map_err(anyhow::Error::from).context("vacuum database")?;
            println!("Database vacuum completed.");
            Ok(0)
        }
    }
}

fn handle_compare(selection: &SelectionArgs, json: bool) -> Result<i32> {
    let request = selection.request()?;
    let db = open_database()?;
    let snapshot = Snapshot::load(&db).map_err(anyhow::Error::from)?;
    let rows = level_cut(
        compare(&snapshot, &request).map_err(anyhow::Error::from)?,
        selection.level,
    );

    if json {
        let serialized =
            serde_json::to_string_pretty(&rows).context("serialize comparison rows")?;
        println!("{serialized}");
    } else {
        print_rows_table(&rows);
        if snapshot.skipped_orphans > 0 {
            println!("\n{} orphaned reading(s) skipped.", snapshot.skipped_orphans);
        }
    }
    Ok(0)
}

fn handle_graph(selection: &SelectionArgs, labels: bool, lines: &[String]) -> Result<i32> {
    let request = selection.request()?;
    let db = open_database()?;
    let snapshot = Snapshot::load(&db).map_err(anyhow::Error::from)?;
    let data = bucketed(&snapshot, &request).map_err(anyhow::Error::from)?;

    let mut overrides = SeriesOverrides::new();
    for spec in lines {
        let (category, slot) = parse_line_override(spec)?;
        overrides.set(category, slot, SeriesKind::Line);
    }

    let graph_request = GraphRequest {
        level: selection.level,
        filter: selection.filter_category.clone(),
        show_labels: labels,
        overrides,
    };
    let model = build_chart(&data, &graph_request).map_err(anyhow::Error::from)?;
    let serialized = serde_json::to_string_pretty(&model).context("serialize chart model")?;
    println!("{serialized}");
    Ok(0)
}

fn handle_export(selection: &SelectionArgs, out: Option<PathBuf>) -> Result<i32> {
    let request = selection.request()?;
    let db = open_database()?;
    let rows = level_cut(
        releve_lib::compare::compare_from_db(&db, &request).map_err(anyhow::Error::from)?,
        selection.level,
    );

    let text = export_rows(&rows).map_err(anyhow::Error::from)?;
    let path = out.unwrap_or_else(|| {
        PathBuf::from(releve_lib::export::default_export_filename(&Utc::now()))
    });
    let outcome = releve_lib::export::write_export(&path, &text)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("write export to {}", path.display()))?;

    println!("Export written to {}", outcome.path.display());
    println!("SHA-256: {}", outcome.sha256);
    Ok(0)
}

/// Apply the display-level cut to flat rows: levels 1-4 keep only rows whose
/// category path sits at that exact depth.
fn level_cut(rows: Vec<ComparisonRow>, level: u8) -> Vec<ComparisonRow> {
    if level >= 5 {
        return rows;
    }
    rows.into_iter()
        .filter(|row| path_depth(&row.category_path) == usize::from(level))
        .collect()
}

/// Parse a `CATEGORY@1` / `CATEGORY@2` line override. The split is on the
/// last `@` so category names containing `@` stay intact.
fn parse_line_override(spec: &str) -> Result<(String, PeriodSlot)> {
    let Some((category, slot)) = spec.rsplit_once('@') else {
        anyhow::bail!("expected CATEGORY@1 or CATEGORY@2, got {spec:?}");
    };
    let slot = match slot {
        "1" => PeriodSlot::Period1,
        "2" => PeriodSlot::Period2,
        other => anyhow::bail!("period must be 1 or 2, got {other:?}"),
    };
    if category.is_empty() {
        anyhow::bail!("category name must not be empty in {spec:?}");
    }
    Ok((category.to_string(), slot))
}

fn print_rows_table(rows: &[ComparisonRow]) {
    const TABLE_COLUMNS: [SortColumn; 12] = [
        SortColumn::Id,
        SortColumn::Date,
        SortColumn::Category,
        SortColumn::Meter,
        SortColumn::Parameter,
        SortColumn::Value,
        SortColumn::Unit,
        SortColumn::Target,
        SortColumn::Max,
        SortColumn::Difference,
        SortColumn::Status,
        SortColumn::Note,
    ];

    let mut widths: Vec<usize> = EXPORT_HEADERS.iter().map(|h| h.len()).collect();
    // The period marker column comes first on screen.
    let mut rendered: Vec<(String, Vec<String>)> = Vec::with_capacity(rows.len());
    for row in rows {
        let cells: Vec<String> = TABLE_COLUMNS
            .iter()
            .map(|&column| cell(row, column))
            .collect();
        for (width, value) in widths.iter_mut().zip(&cells) {
            *width = (*width).max(value.len());
        }
        rendered.push((row.period.as_str().to_string(), cells));
    }

    print!("{:<8} ", "period");
    for (header, width) in EXPORT_HEADERS.iter().zip(widths.iter().copied()) {
        print!("{header:<width$} ");
    }
    println!();
    for (period, cells) in &rendered {
        print!("{period:<8} ");
        for (value, width) in cells.iter().zip(widths.iter().copied()) {
            print!("{value:<width$} ");
        }
        println!();
    }
    println!("\n{} row(s).", rows.len());
}

fn print_report_json(report: &DbHealthReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize health report")?;
    println!("{json}");
    Ok(())
}

fn print_report_table(report: &DbHealthReport) {
    println!("Database health report");
    println!("Status       : {}", status_label(&report.status));
    println!("Schema hash  : {}", report.schema_hash);
    println!("App version  : {}", report.app_version);
    println!("Generated at : {}", report.generated_at);

    println!("\nChecks:");
    println!(
        "{:<20} {:<7} {:>13}  Details",
        "Check", "Passed", "Duration (ms)"
    );
    for check in &report.checks {
        let passed = if check.passed { "yes" } else { "no" };
        let details = check
            .details
            .as_deref()
            .map(|value| value.replace('\n', " "))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<7} {:>13}  {}",
            check.name, passed, check.duration_ms, details
        );
    }

    if report.offenders.is_empty() {
        println!("\nOffenders: none");
    } else {
        println!("\nOffenders:");
        println!("{:<20} {:>10}  Message", "Table", "RowID");
        for offender in &report.offenders {
            println!(
                "{:<20} {:>10}  {}",
                offender.table,
                offender.rowid,
                offender.message.replace('\n', " ")
            );
        }
    }
}

fn status_label(status: &DbHealthStatus) -> &'static str {
    match status {
        DbHealthStatus::Ok => "ok",
        DbHealthStatus::Error => "error",
    }
}

fn default_db_path() -> Result<PathBuf> {
    if let Ok(fake) = std::env::var("RELEVE_FAKE_APPDATA") {
        return Ok(PathBuf::from(fake).join("releve.sqlite3"));
    }

    let base = dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?;
    Ok(base.join("releve").join("releve.sqlite3"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_override_parses_both_slots() {
        assert_eq!(
            parse_line_override("Energie@1").unwrap(),
            ("Energie".to_string(), PeriodSlot::Period1)
        );
        assert_eq!(
            parse_line_override("A > B@2").unwrap(),
            ("A > B".to_string(), PeriodSlot::Period2)
        );
    }

    #[test]
    fn line_override_splits_on_last_at_sign() {
        assert_eq!(
            parse_line_override("weird@name@1").unwrap(),
            ("weird@name".to_string(), PeriodSlot::Period1)
        );
    }

    #[test]
    fn line_override_rejects_bad_specs() {
        assert!(parse_line_override("Energie").is_err());
        assert!(parse_line_override("Energie@3").is_err());
        assert!(parse_line_override("@1").is_err());
    }

    #[test]
    fn selection_args_reject_bad_period() {
        let selection = SelectionArgs {
            period1: "2024-03:2024-01".to_string(),
            period2: "2025-01:2025-03".to_string(),
            mode: ModeArg::Monthly,
            level: 5,
            filter_meter: None,
            filter_category: None,
            filter_parameter: None,
        };
        assert!(selection.request().is_err());
    }

    #[test]
    fn selection_args_reject_bad_level() {
        let selection = SelectionArgs {
            period1: "2024-01:2024-03".to_string(),
            period2: "2025-01:2025-03".to_string(),
            mode: ModeArg::Monthly,
            level: 6,
            filter_meter: None,
            filter_category: None,
            filter_parameter: None,
        };
        assert!(selection.request().is_err());
    }
}
