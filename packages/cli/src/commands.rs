//! Subcommand implementations.

use std::collections::BTreeMap;
use std::error::Error;

use chrono::{SubsecRound as _, Utc};
use cityscope_cli_utils::{MultiProgress, Spinner};
use cityscope_config::Config;
use cityscope_database::{DbError, snapshots as store};
use cityscope_dataset::{DataPaths, Dataset, DatasetSummary};
use cityscope_models::{
    MetricSnapshot, NeighborhoodId, NeighborhoodMetrics, Score, ScoreBreakdown,
};
use cityscope_scoring::{compute_breakdowns, snapshots};

fn load(multi: &MultiProgress, config: &Config) -> Result<Dataset, Box<dyn Error>> {
    let spinner = Spinner::start(
        multi,
        &format!("Loading reference data from {}...", config.data.dir.display()),
    );
    match Dataset::load(&DataPaths::from_config(&config.data)) {
        Ok(dataset) => {
            spinner.finish(format!(
                "Loaded {} neighborhoods",
                dataset.summary().neighborhoods
            ));
            Ok(dataset)
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

/// Runs a full-cohort scoring pass, prints it next to the last recorded
/// scores, and records it unless `dry_run` is set. Returns the number of
/// snapshots written.
pub fn score(multi: &MultiProgress, config: &Config, dry_run: bool) -> Result<usize, Box<dyn Error>> {
    let dataset = load(multi, config)?;
    let cohort = dataset.cohort_metrics(&[], config.proximity.radii());
    let breakdowns = compute_breakdowns(&cohort);
    let previous = previous_scores(config)?;

    for line in render_scores(&dataset, &cohort, &breakdowns, &previous) {
        println!("{line}");
    }

    if dry_run {
        log::info!("Dry run, not recording snapshots");
        return Ok(0);
    }

    let batch = snapshots(&cohort, Utc::now().trunc_subsecs(3));
    let spinner = Spinner::start(
        multi,
        &format!("Opening {}...", config.database.path.display()),
    );

    match record(&spinner, config, &batch) {
        Ok(written) => {
            spinner.finish(format!(
                "Recorded {written} snapshots in {}",
                config.database.path.display()
            ));
            Ok(written)
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

fn record(spinner: &Spinner, config: &Config, batch: &[MetricSnapshot]) -> Result<usize, DbError> {
    let conn = store::open(&config.database.path)?;
    spinner.set_message(format!("Recording {} snapshots...", batch.len()));
    store::append(&conn, batch)
}

/// Most recent recorded score of every neighborhood. Empty when the store
/// has not been created yet.
fn previous_scores(config: &Config) -> Result<BTreeMap<NeighborhoodId, Score>, DbError> {
    if !config.database.path.exists() {
        return Ok(BTreeMap::new());
    }

    let conn = store::open(&config.database.path)?;
    Ok(store::latest_many(&conn, &[])?
        .into_iter()
        .map(|s| (s.neighborhood_id, s.score))
        .collect())
}

/// Prints a neighborhood's stored snapshots, newest first.
pub fn history(
    config: &Config,
    id: NeighborhoodId,
    limit: Option<usize>,
) -> Result<Vec<MetricSnapshot>, Box<dyn Error>> {
    let conn = store::open(&config.database.path)?;
    let rows = store::history(&conn, id, limit)?;

    if rows.is_empty() {
        println!("No snapshots for neighborhood {id}");
    } else {
        for line in render_history(&rows) {
            println!("{line}");
        }
    }

    Ok(rows)
}

/// Row counts from [`check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    /// Kept rows per reference file.
    pub summary: DatasetSummary,
    /// Snapshots in the store, `None` if it does not exist yet.
    pub stored_snapshots: Option<u64>,
}

/// Loads the reference data and prints how many rows of each file were
/// kept, plus the size of the snapshot history.
pub fn check(multi: &MultiProgress, config: &Config) -> Result<CheckReport, Box<dyn Error>> {
    let summary = load(multi, config)?.summary();

    let stored_snapshots = if config.database.path.exists() {
        Some(store::count(&store::open(&config.database.path)?)?)
    } else {
        None
    };

    println!("neighborhoods:     {}", summary.neighborhoods);
    println!("listings:          {}", summary.listings);
    println!("orphaned listings: {}", summary.orphaned_listings);
    println!("transit stops:     {}", summary.stops);
    println!("malls:             {}", summary.malls);
    match stored_snapshots {
        Some(count) => println!("stored snapshots:  {count}"),
        None => println!("stored snapshots:  none ({} missing)", config.database.path.display()),
    }

    Ok(CheckReport {
        summary,
        stored_snapshots,
    })
}

fn render_scores(
    dataset: &Dataset,
    cohort: &[NeighborhoodMetrics],
    breakdowns: &BTreeMap<NeighborhoodId, ScoreBreakdown>,
    previous: &BTreeMap<NeighborhoodId, Score>,
) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>6}  {:<24}  {:>10}  {:>7}  {:>5}  {:>5}  {:>5}  band",
        "id", "name", "avg rent", "transit", "malls", "prev", "score"
    )];

    for metrics in cohort {
        let Some(breakdown) = breakdowns.get(&metrics.neighborhood_id) else {
            continue;
        };
        let name = dataset
            .neighborhood(metrics.neighborhood_id)
            .map_or("", |n| n.name.as_str());
        let prev = previous
            .get(&metrics.neighborhood_id)
            .map_or_else(|| "-".to_string(), ToString::to_string);

        lines.push(format!(
            "{:>6}  {:<24}  {:>10.2}  {:>7}  {:>5}  {:>5}  {:>5}  {}",
            metrics.neighborhood_id,
            name,
            metrics.avg_rent,
            metrics.transit_count,
            metrics.mall_count,
            prev,
            breakdown.score,
            breakdown.band(),
        ));
    }

    lines
}

fn render_history(rows: &[MetricSnapshot]) -> Vec<String> {
    rows.iter()
        .map(|s| {
            format!(
                "{}  score {:>3}  rent {:>10.2}  transit {:>4}  malls {:>3}",
                s.captured_at.format("%Y-%m-%d %H:%M:%S%.3f"),
                s.score,
                s.avg_rent,
                s.transit_count,
                s.mall_count,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use cityscope_cli_utils::ProgressDrawTarget;
    use cityscope_config::{DataConfig, DatabaseConfig};

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    struct Workspace(PathBuf);

    impl Workspace {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("cityscope-cli-{name}-{}", std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join("neighborhoods.csv"),
                "id,name,city,centerLat,centerLng\n\
                 1,Downtown,Vancouver,49.2827,-123.1207\n\
                 2,Kitsilano,Vancouver,49.2684,-123.1683\n",
            )
            .unwrap();
            std::fs::write(
                dir.join("listings.csv"),
                "id,neighborhoodId,price,dateListed\n10,1,3000,\n11,2,1500,\n12,5,900,\n",
            )
            .unwrap();
            std::fs::write(
                dir.join("stops.txt"),
                "stop_id,stop_name,stop_lat,stop_lon\n50002,Granville,49.2832,-123.1163\n",
            )
            .unwrap();
            Self(dir)
        }

        fn path(&self) -> &Path {
            &self.0
        }

        fn config(&self) -> Config {
            Config {
                data: DataConfig {
                    dir: self.path().to_path_buf(),
                    ..DataConfig::default()
                },
                database: DatabaseConfig {
                    path: self.path().join("db").join("history.duckdb"),
                },
                ..Config::default()
            }
        }
    }

    impl Drop for Workspace {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn dry_run_does_not_touch_the_store() {
        let workspace = Workspace::new("dry-run");
        let config = workspace.config();

        assert_eq!(score(&hidden(), &config, true).unwrap(), 0);
        assert!(!config.database.path.exists());
        assert!(previous_scores(&config).unwrap().is_empty());
    }

    #[test]
    fn score_then_history_round_trips() {
        let workspace = Workspace::new("score");
        let config = workspace.config();

        assert_eq!(score(&hidden(), &config, false).unwrap(), 2);
        assert_eq!(score(&hidden(), &config, false).unwrap(), 2);

        let rows = history(&config, 2, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].captured_at >= rows[1].captured_at);
        // Cheapest, no stops, and a degenerate mall range (50 * 0.10).
        assert_eq!(rows[0].score, 60);

        assert_eq!(history(&config, 2, Some(1)).unwrap().len(), 1);
        assert!(history(&config, 42, None).unwrap().is_empty());

        let previous = previous_scores(&config).unwrap();
        assert_eq!(previous.into_iter().collect::<Vec<_>>(), vec![(1, 40), (2, 60)]);
    }

    #[test]
    fn check_reports_kept_rows() {
        let workspace = Workspace::new("check");
        let config = workspace.config();
        let report = check(&hidden(), &config).unwrap();

        assert_eq!(report.summary.neighborhoods, 2);
        assert_eq!(report.summary.listings, 2);
        assert_eq!(report.summary.orphaned_listings, 1);
        assert_eq!(report.summary.stops, 1);
        assert_eq!(report.summary.malls, 0);
        assert_eq!(report.stored_snapshots, None);

        score(&hidden(), &config, false).unwrap();
        assert_eq!(check(&hidden(), &config).unwrap().stored_snapshots, Some(2));
    }

    #[test]
    fn renders_one_line_per_scored_neighborhood() {
        let workspace = Workspace::new("render");
        let config = workspace.config();
        let dataset = Dataset::load(&DataPaths::from_config(&config.data)).unwrap();
        let cohort = dataset.cohort_metrics(&[], config.proximity.radii());
        let previous: BTreeMap<NeighborhoodId, Score> = [(2, 72)].into_iter().collect();
        let lines = render_scores(&dataset, &cohort, &compute_breakdowns(&cohort), &previous);

        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Downtown"));
        assert!(lines[1].contains("    -     40"));
        assert!(lines[2].contains("   72     60"));
        assert!(lines[2].trim_end().ends_with("fair"));
    }
}
