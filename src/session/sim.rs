//! Simulation path: synthetic draws with the same output shape as a real
//! measurement.
//!
//! Used when hardware is unavailable at session start and when detection
//! fails (cap exhausted or invalid exposure window). The record carries the
//! simulation version stamp so downstream consumers can tell the paths
//! apart.

use super::SessionIds;
use crate::config::defaults::GAS_VERSION_SIMULATION;
use crate::types::MeasurementRecord;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

/// Bristol scale classes reported by the image analysis service.
const BRISTOL_TYPES: [&str; 7] = ["B1", "B2", "B3", "B4", "B5", "B6", "B7"];

/// Color classes reported by the image analysis service (C1..C17).
fn random_color_type<R: Rng>(rng: &mut R) -> String {
    format!("C{}", rng.gen_range(1..=17))
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Draw a simulated measurement record.
///
/// Exposure draws are uniform on `[0, 10)`; ratios are derived from the
/// draws with the zero-total guard, so the record obeys the same arithmetic
/// invariants as a real one.
pub fn simulated_record<R: Rng>(
    rng: &mut R,
    ids: &SessionIds,
    profile_id: Option<i64>,
) -> MeasurementRecord {
    let h2s_exposure = round4(rng.gen_range(0.0..10.0));
    let vocs_exposure = round4(rng.gen_range(0.0..10.0));
    let total = h2s_exposure + vocs_exposure;
    let (h2s_ratio, vocs_ratio) = if total == 0.0 {
        (0.0, 0.0)
    } else {
        (100.0 * h2s_exposure / total, 100.0 * vocs_exposure / total)
    };

    MeasurementRecord {
        profile_id,
        gas_id: ids.gas_id.clone(),
        test_id: ids.test_id.clone(),
        gas_version: GAS_VERSION_SIMULATION.to_string(),
        h2s_abs_exposure: h2s_exposure,
        h2s_offset_ppm: 0.0,
        h2s_ppm: round4(rng.gen_range(0.0..20.0)),
        h2s_ratio_value_pct: h2s_ratio,
        sort: 0,
        success: "ok".to_string(),
        time_sec: 0.0,
        total_abs_exposure: total,
        vocs_abs_exposure: vocs_exposure,
        vocs_offset_ppm: 0.0,
        vocs_ppm: round4(rng.gen_range(0.0..50.0)),
        vocs_ratio_value_pct: vocs_ratio,
        created_at: None,
        image_upload_response: None,
        image_analysis: None,
        image_result_url: None,
    }
}

/// Dummy image-analysis payload in the analysis table schema, covering all
/// four capture slots.
pub fn simulated_image_analysis<R: Rng>(rng: &mut R, ids: &SessionIds) -> Value {
    let now = chrono::Local::now();
    let now_str = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let ts_file = now.format("%Y%m%d%H%M%S").to_string();
    let composite = ids.composite();

    let bristol: Vec<&str> = (0..4)
        .map(|_| *BRISTOL_TYPES.choose(rng).unwrap_or(&"B4"))
        .collect();
    let colors: Vec<String> = (0..4).map(|_| random_color_type(rng)).collect();
    let rgb = format!(
        "{},{},{}",
        rng.gen_range(50..=200),
        rng.gen_range(50..=200),
        rng.gen_range(50..=200)
    );

    json!({
        "image_version": "GV.1.0",
        "gas_id": ids.gas_id,
        "test_id": ids.test_id,
        "file_name_0": format!("{composite}-{ts_file}-0.jpg"),
        "file_name_1": format!("{composite}-{ts_file}-1.jpg"),
        "file_name_2": format!("{composite}-{ts_file}-2.jpg"),
        "file_name_3": format!("{composite}-{ts_file}-3.jpg"),
        "data_captured_time_0": now_str,
        "data_captured_time_1": now_str,
        "data_captured_time_2": now_str,
        "data_captured_time_3": now_str,
        "input_datetime": now_str,
        "output_datetime": now_str,
        "raw_bristol_type_0": bristol[0],
        "raw_bristol_type_1": bristol[1],
        "raw_bristol_type_2": bristol[2],
        "raw_bristol_type_3": bristol[3],
        "bristol_type": bristol[0],
        "raw_color_type_0": colors[0],
        "raw_color_type_1": colors[1],
        "raw_color_type_2": colors[2],
        "raw_color_type_3": colors[3],
        "color_type": colors[0],
        "rgb_color": rgb,
        "time_duration": (rng.gen_range(0.2_f64..1.5) * 1000.0).round() / 1000.0,
        "process_success": 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ids() -> SessionIds {
        SessionIds {
            gas_id: "ABCDE".into(),
            test_id: "00042".into(),
        }
    }

    #[test]
    fn simulated_record_obeys_ratio_invariant() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let record = simulated_record(&mut rng, &ids(), None);
            let total = record.total_abs_exposure;
            assert!(total >= 0.0);
            if total == 0.0 {
                assert!((record.h2s_ratio_value_pct).abs() < f64::EPSILON);
                assert!((record.vocs_ratio_value_pct).abs() < f64::EPSILON);
            } else {
                let sum = record.h2s_ratio_value_pct + record.vocs_ratio_value_pct;
                assert!((sum - 100.0).abs() < 1e-9);
            }
            assert_eq!(record.success, "ok");
            assert_eq!(record.gas_version, "0.0.1");
        }
    }

    #[test]
    fn simulated_analysis_covers_all_slots() {
        let mut rng = StdRng::seed_from_u64(9);
        let payload = simulated_image_analysis(&mut rng, &ids());
        for slot in 0..4 {
            assert!(payload.get(format!("file_name_{slot}")).is_some());
            assert!(payload.get(format!("raw_bristol_type_{slot}")).is_some());
        }
        assert_eq!(payload["gas_id"], "ABCDE");
        assert_eq!(payload["process_success"], 1);
    }
}
