//! Causality checks across the whole feature set
//!
//! - no row depends on observations after its own timestamp
//! - training columns never expose an unlagged window at or beyond the horizon

#[cfg(test)]
mod causality_tests {
    use fxflow::feature_core::causality::{parse_column_lag, parse_column_window};
    use fxflow::feature_core::{
        CausalityPolicy, DerivedSeries, FeatureSchema, FeatureTable, RelatedGroup, WindowSets,
    };
    use fxflow::pipeline::{compute_unit, MonthPartition, PeerGroups};
    use fxflow::Instrument;
    use std::sync::Arc;

    const BEFORE: i64 = 760;
    const AFTER: i64 = 240;

    fn month() -> MonthPartition {
        MonthPartition::parse("2024-05").unwrap()
    }

    fn values(phase: f64) -> Vec<f64> {
        (0..BEFORE + AFTER)
            .map(|i| 1.1 + 0.004 * ((i as f64) * 0.021 + phase).sin() + 0.000_01 * i as f64)
            .collect()
    }

    fn series(id: &str, values: &[f64]) -> Arc<DerivedSeries> {
        Arc::new(DerivedSeries::from_values(
            Instrument::parse(id).unwrap(),
            month().start_ts() - BEFORE * 60,
            values,
            5,
        ))
    }

    fn bits(values: &[Option<f64>]) -> Vec<Option<u64>> {
        values.iter().map(|v| v.map(f64::to_bits)).collect()
    }

    #[test]
    fn test_future_observations_do_not_leak_into_past_rows() {
        let schema = FeatureSchema::generate(&WindowSets::default(), CausalityPolicy::default());

        let target_values = values(0.0);
        let peer_values = values(0.9);

        // Perturb everything after the cutoff, in the target and its peer
        let cutoff_row = 100usize;
        let cutoff_index = BEFORE as usize + cutoff_row;
        let shocked = |vals: &[f64]| -> Vec<f64> {
            vals.iter()
                .enumerate()
                .map(|(i, v)| if i > cutoff_index { v * 1.05 } else { *v })
                .collect()
        };

        let mut peers = PeerGroups::new();
        peers.insert(RelatedGroup::SharesQuote, vec![series("GBPUSD", &peer_values)]);
        let mut shocked_peers = PeerGroups::new();
        shocked_peers.insert(RelatedGroup::SharesQuote, vec![series("GBPUSD", &shocked(&peer_values))]);

        let baseline = compute_unit(&schema, &series("EURUSD", &target_values), &peers, month(), 10);
        let shocked_run = compute_unit(
            &schema,
            &series("EURUSD", &shocked(&target_values)),
            &shocked_peers,
            month(),
            10,
        );

        let mut changed_after_cutoff = false;
        for (a, b) in baseline.iter().zip(&shocked_run) {
            assert_eq!(a.table, b.table);
            for (row, (ra, rb)) in a.rows.iter().zip(&b.rows).enumerate() {
                if row <= cutoff_row {
                    assert_eq!(bits(&ra.values), bits(&rb.values), "{} row {}", a.table, row);
                } else if bits(&ra.values) != bits(&rb.values) {
                    changed_after_cutoff = true;
                }
            }
        }
        assert!(changed_after_cutoff);
    }

    #[test]
    fn test_training_columns_respect_horizon() {
        for horizon in [30, 60, 120] {
            let policy = CausalityPolicy::new(horizon);
            let schema = FeatureSchema::generate(&WindowSets::default(), policy);
            let manifest = schema.training_manifest();
            assert_eq!(manifest.min_lag_minutes, horizon + 1);

            for table in FeatureTable::all() {
                let columns = &manifest.tables[table.table_name()];
                assert!(!columns.is_empty());
                for name in columns {
                    let window = parse_column_window(name);
                    let lag = parse_column_lag(name);
                    let causal = window.map_or(true, |w| w < horizon) || lag.map_or(false, |l| l > horizon);
                    assert!(causal, "{} leaks at horizon {}", name, horizon);
                }
            }
        }
    }

    #[test]
    fn test_every_long_window_has_lagged_twin() {
        let schema = FeatureSchema::generate(&WindowSets::default(), CausalityPolicy::default());
        for table in schema.tables() {
            for column in &table.columns {
                if column.lag_minutes.is_none() && column.window_minutes.map_or(false, |w| w >= 60) {
                    let twin = format!("{}_lag61", column.name);
                    assert!(table.contains(&twin), "{} missing {}", table.table, twin);
                }
            }
        }
    }
}
