mod util;

use anyhow::Result;

use releve_lib::aggregate::{sum_at_level, Filters};
use releve_lib::compare::{
    bucketed, compare, BucketedData, CompareMode, CompareRequest, MonthSpan, PeriodSlot, Snapshot,
};
use releve_lib::hierarchy::Bucket;
use releve_lib::meters;
use releve_lib::thresholds::BreachStatus;
use releve_lib::AppError;

fn request(mode: CompareMode) -> CompareRequest {
    CompareRequest {
        period1: MonthSpan::parse("2024-01:2024-03").unwrap(),
        period2: MonthSpan::parse("2025-01:2025-03").unwrap(),
        mode,
        filters: Filters::default(),
    }
}

#[test]
fn monthly_mode_produces_aligned_pairs_with_bucket_totals() -> Result<()> {
    let db = util::open_db()?;
    util::seed_fixture(&db)?;
    let snapshot = Snapshot::load(&db)?;

    let BucketedData::Monthly { pairs } = bucketed(&snapshot, &request(CompareMode::Monthly))?
    else {
        panic!("expected monthly data");
    };

    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].period1.to_string(), "2024-01");
    assert_eq!(pairs[0].period2.to_string(), "2025-01");
    assert_eq!(pairs[2].period1.to_string(), "2024-03");
    assert_eq!(pairs[2].period2.to_string(), "2025-03");

    // January, bucket "12": A (meter A, 90+1) and A > B (40+1) plus the
    // uncategorized meter under the sentinel path.
    let depth12 = pairs[0]
        .buckets
        .iter()
        .find(|b| b.bucket == Bucket::Depth12)
        .unwrap();
    assert_eq!(depth12.period1.get("A"), Some(&91.0));
    assert_eq!(depth12.period1.get("A > B"), Some(&41.0));
    assert_eq!(depth12.period1.get("Aucune"), Some(&6.0));
    assert_eq!(depth12.period1.get("A > B > C"), None);

    let all = pairs[0]
        .buckets
        .iter()
        .find(|b| b.bucket == Bucket::All)
        .unwrap();
    assert_eq!(all.period1.get("A > B > C"), Some(&11.0));
    assert_eq!(all.period2.get("A"), Some(&91.0));
    Ok(())
}

#[test]
fn cumulative_mode_sums_whole_periods() -> Result<()> {
    let db = util::open_db()?;
    util::seed_fixture(&db)?;
    let snapshot = Snapshot::load(&db)?;

    let BucketedData::Cumulative { buckets } =
        bucketed(&snapshot, &request(CompareMode::Cumulative))?
    else {
        panic!("expected cumulative data");
    };

    let all = buckets.iter().find(|b| b.bucket == Bucket::All).unwrap();
    // Meter A: (90+1) + (90+2) + (90+3) per year.
    assert_eq!(all.period1.get("A"), Some(&276.0));
    assert_eq!(all.period2.get("A"), Some(&276.0));
    assert_eq!(all.period1.get("A > B > C"), Some(&36.0));
    Ok(())
}

#[test]
fn level_cut_on_snapshot_rows_matches_spec_depths() -> Result<()> {
    let db = util::open_db()?;
    util::seed_fixture(&db)?;
    let snapshot = Snapshot::load(&db)?;

    let level2 = sum_at_level(snapshot.rows(), 2, &Filters::default())?;
    assert_eq!(
        level2.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["A > B"]
    );

    let level5 = sum_at_level(snapshot.rows(), 5, &Filters::default())?;
    assert_eq!(level5.len(), 4);
    assert!(level5.contains_key("A"));
    assert!(level5.contains_key("A > B"));
    assert!(level5.contains_key("A > B > C"));
    assert!(level5.contains_key("Aucune"));
    Ok(())
}

#[test]
fn compare_rows_join_paths_bounds_and_status() -> Result<()> {
    let db = util::open_db()?;
    let fixture = util::seed_fixture(&db)?;
    // Push one reading over the max bound.
    util::add_reading(&db, &fixture.meter_a, &fixture.param_a, "2024-02-20", 120.0)?;

    let snapshot = Snapshot::load(&db)?;
    let rows = compare(&snapshot, &request(CompareMode::Monthly))?;
    assert_eq!(rows.len(), 25);

    let breach = rows.iter().find(|r| r.value == 120.0).unwrap();
    assert_eq!(breach.period, PeriodSlot::Period1);
    assert_eq!(breach.category_path, "A");
    assert_eq!(breach.status, BreachStatus::Exceed);
    assert_eq!(breach.difference, Some(20.0));
    assert_eq!(breach.max_value, Some(100.0));
    assert_eq!(breach.unit.as_deref(), Some("kWh"));

    // Meter A readings of 91..93 sit above target 80 but under max 100.
    let over_target = rows
        .iter()
        .find(|r| r.meter_name == "Compteur A" && r.value == 91.0)
        .unwrap();
    assert_eq!(over_target.status, BreachStatus::Exceed);
    assert_eq!(over_target.difference, Some(11.0));

    // Meter B readings of 41..43 sit below target 50.
    let below = rows
        .iter()
        .find(|r| r.meter_name == "Compteur B" && r.period == PeriodSlot::Period1)
        .unwrap();
    assert_eq!(below.status, BreachStatus::Below);
    assert_eq!(below.difference, Some(-9.0));

    // No bounds at all is Ok with no difference.
    let unbounded = rows
        .iter()
        .find(|r| r.meter_name == "Compteur C")
        .unwrap();
    assert_eq!(unbounded.status, BreachStatus::Ok);
    assert_eq!(unbounded.difference, None);
    Ok(())
}

#[test]
fn text_filters_trim_rows_and_totals_together() -> Result<()> {
    let db = util::open_db()?;
    util::seed_fixture(&db)?;
    let snapshot = Snapshot::load(&db)?;

    let mut filtered = request(CompareMode::Monthly);
    filtered.filters.meter = Some("compteur a".to_string());

    let rows = compare(&snapshot, &filtered)?;
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.meter_name == "Compteur A"));

    let BucketedData::Monthly { pairs } = bucketed(&snapshot, &filtered)? else {
        panic!("expected monthly data");
    };
    let all = pairs[0]
        .buckets
        .iter()
        .find(|b| b.bucket == Bucket::All)
        .unwrap();
    assert_eq!(all.period1.len(), 1);
    assert_eq!(all.period1.get("A"), Some(&91.0));
    Ok(())
}

#[test]
fn orphaned_readings_are_skipped_silently() -> Result<()> {
    let db = util::open_db()?;
    let fixture = util::seed_fixture(&db)?;
    meters::delete_meter(&db, &fixture.meter_loose.id)?;

    let snapshot = Snapshot::load(&db)?;
    assert_eq!(snapshot.skipped_orphans, 6);

    let rows = compare(&snapshot, &request(CompareMode::Monthly))?;
    assert_eq!(rows.len(), 18);
    assert!(rows.iter().all(|r| r.meter_name != "Compteur libre"));
    Ok(())
}

#[test]
fn compare_is_idempotent_for_unchanged_storage() -> Result<()> {
    let db = util::open_db()?;
    util::seed_fixture(&db)?;

    let req = request(CompareMode::Monthly);
    let first = compare(&Snapshot::load(&db)?, &req)?;
    let second = compare(&Snapshot::load(&db)?, &req)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn cyclic_parent_chain_yields_truncated_path_not_a_hang() -> Result<()> {
    let db = util::open_db()?;
    let fixture = util::seed_fixture(&db)?;

    // Close the loop: A's parent becomes C.
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE categories SET parent_id = ?1 WHERE id = ?2",
            (&fixture.cat_c.id, &fixture.cat_a.id),
        )
        .map_err(AppError::from)?;
        Ok(())
    })?;

    let snapshot = Snapshot::load(&db)?;
    let rows = compare(&snapshot, &request(CompareMode::Monthly))?;
    assert!(!rows.is_empty());
    // Every path is finite and still names the reading's own category last.
    let row = rows
        .iter()
        .find(|r| r.meter_name == "Compteur A")
        .unwrap();
    assert!(row.category_path.ends_with("A"));
    assert!(row.category_path.len() < 64 * 8);
    Ok(())
}

#[test]
fn months_outside_either_period_are_ignored() -> Result<()> {
    let db = util::open_db()?;
    let fixture = util::seed_fixture(&db)?;
    util::add_reading(&db, &fixture.meter_a, &fixture.param_a, "2024-06-15", 999.0)?;

    let snapshot = Snapshot::load(&db)?;
    let rows = compare(&snapshot, &request(CompareMode::Monthly))?;
    assert!(rows.iter().all(|r| r.value != 999.0));
    Ok(())
}
