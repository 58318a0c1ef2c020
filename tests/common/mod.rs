#![allow(dead_code)]

use std::path::Path;

use serde_json::{Value, json};

/// Depth-one tree splitting `feature` at `threshold`.
pub fn stump(feature: usize, threshold: f64, left: Value, right: Value) -> Value {
    json!({
        "children_left": [1, -1, -1],
        "children_right": [2, -1, -1],
        "feature": [feature, -2, -2],
        "threshold": [threshold, -2.0, -2.0],
        "value": [[0.0, 0.0], left, right],
    })
}

/// Two-label classifier on raw features: `flag_0` fires for age > 35,
/// `flag_1` for haemoglobin <= 11.
pub fn classifier_artifact() -> Value {
    json!({
        "estimators": [
            {
                "classes": [0, 1],
                "forest": {"trees": [stump(0, 35.0, json!([9.0, 1.0]), json!([1.0, 9.0]))]}
            },
            {
                "classes": [0, 1],
                "forest": {"trees": [stump(6, 11.0, json!([2.0, 8.0]), json!([10.0, 0.0]))]}
            }
        ]
    })
}

/// Regressor on the 17 raw columns: 0.25 below age 35, 0.75 above.
pub fn regressor_artifact() -> Value {
    let mut tree = stump(0, 35.0, json!([0.25]), json!([0.75]));
    tree["value"][0] = json!([0.0]);
    json!({
        "n_features": 17,
        "forest": {"trees": [tree]}
    })
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}
