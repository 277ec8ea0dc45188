//! Explainability collaborator.
//!
//! Attributes a model score to the derived features of one farmer, measured
//! against a background distribution, and renders the attribution as an SVG bar
//! chart returned base64 encoded.

use crate::errors::ResolveError;
use crate::features::{FeatureRow, FEATURE_NAMES};
use crate::model::LoanModel;
use crate::models::{Explanation, FeatureContribution};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use std::sync::Arc;

pub const SVG_MEDIA_TYPE: &str = "image/svg+xml";

/// Produces a visual explanation for one feature row.
pub trait Explainer: Send + Sync {
    fn explain(
        &self,
        row: &FeatureRow,
        background: &[FeatureRow],
    ) -> Result<Explanation, ResolveError>;
}

/// Interventional contribution explainer.
///
/// The contribution of feature `i` is `f(x) - mean_b f(x with x_i := b_i)`,
/// where `f` is the model margin and `b` ranges over the background rows. For a
/// linear margin this equals `w_i * (x_i - mean(b_i))`.
pub struct ContributionExplainer {
    model: Arc<dyn LoanModel>,
    /// `None` uses every background row.
    background_limit: Option<usize>,
}

impl ContributionExplainer {
    pub fn new(model: Arc<dyn LoanModel>, background_limit: Option<usize>) -> Self {
        Self {
            model,
            background_limit: background_limit.map(|limit| limit.max(1)),
        }
    }
}

/// Picks at most `limit` rows at an even stride, keeping the first row.
pub fn sample_background(background: &[FeatureRow], limit: usize) -> Vec<&FeatureRow> {
    if background.len() <= limit {
        return background.iter().collect();
    }
    let stride = background.len() as f64 / limit as f64;
    (0..limit)
        .map(|i| &background[(i as f64 * stride) as usize])
        .collect()
}

impl Explainer for ContributionExplainer {
    fn explain(
        &self,
        row: &FeatureRow,
        background: &[FeatureRow],
    ) -> Result<Explanation, ResolveError> {
        if background.is_empty() {
            return Err(ResolveError::Model(
                "explanation needs at least one background row".to_string(),
            ));
        }
        let sample = match self.background_limit {
            Some(limit) => sample_background(background, limit),
            None => background.iter().collect(),
        };
        let n = sample.len() as f64;

        let model_output = self.model.margin(row)?;
        let mut base_value = 0.0;
        for b in &sample {
            base_value += self.model.margin(b)?;
        }
        base_value /= n;

        let mut contributions = Vec::with_capacity(FEATURE_NAMES.len());
        for (idx, name) in FEATURE_NAMES.iter().enumerate() {
            let mut replaced_mean = 0.0;
            for b in &sample {
                replaced_mean += self.model.margin(&row.with_value(idx, b.values()[idx]))?;
            }
            replaced_mean /= n;
            contributions.push(FeatureContribution {
                feature: name.to_string(),
                value: row.values()[idx],
                contribution: model_output - replaced_mean,
            });
        }
        contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let svg = render_svg(base_value, model_output, &contributions);
        tracing::debug!(
            "Explanation rendered: {} background rows, {} bytes of SVG",
            sample.len(),
            svg.len()
        );

        Ok(Explanation {
            base_value,
            model_output,
            contributions,
            media_type: SVG_MEDIA_TYPE.to_string(),
            image_base64: B64.encode(svg.as_bytes()),
        })
    }
}

const CHART_WIDTH: f64 = 640.0;
const LABEL_WIDTH: f64 = 200.0;
const ROW_HEIGHT: f64 = 28.0;
const HEADER_HEIGHT: f64 = 48.0;
const POSITIVE_COLOR: &str = "#ff0d57";
const NEGATIVE_COLOR: &str = "#1e88e5";

/// Horizontal bar chart of signed contributions, centred on zero.
pub fn render_svg(base_value: f64, model_output: f64, contributions: &[FeatureContribution]) -> String {
    let height = HEADER_HEIGHT + ROW_HEIGHT * contributions.len() as f64 + 16.0;
    let plot_width = CHART_WIDTH - LABEL_WIDTH - 80.0;
    let axis_x = LABEL_WIDTH + plot_width / 2.0;
    let max_abs = contributions
        .iter()
        .map(|c| c.contribution.abs())
        .fold(0.0_f64, f64::max)
        .max(1e-9);
    let scale = (plot_width / 2.0) / max_abs;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
        w = CHART_WIDTH,
        h = height
    );
    svg.push_str(&format!(
        r#"<text x="8" y="20" font-size="14" font-weight="bold">Model output {:.3} (base {:.3})</text>"#,
        model_output, base_value
    ));
    svg.push_str(&format!(
        r##"<line x1="{x:.1}" y1="{y1}" x2="{x:.1}" y2="{y2:.1}" stroke="#888" stroke-width="1"/>"##,
        x = axis_x,
        y1 = HEADER_HEIGHT - 8.0,
        y2 = height - 8.0
    ));

    for (i, c) in contributions.iter().enumerate() {
        let y = HEADER_HEIGHT + ROW_HEIGHT * i as f64;
        let bar = c.contribution.abs() * scale;
        let (x, color) = if c.contribution >= 0.0 {
            (axis_x, POSITIVE_COLOR)
        } else {
            (axis_x - bar, NEGATIVE_COLOR)
        };
        svg.push_str(&format!(
            r#"<text x="{lx:.1}" y="{ty:.1}" text-anchor="end">{name} = {value:.3}</text>"#,
            lx = LABEL_WIDTH - 8.0,
            ty = y + ROW_HEIGHT / 2.0 + 4.0,
            name = c.feature,
            value = c.value
        ));
        svg.push_str(&format!(
            r#"<rect x="{x:.1}" y="{ry:.1}" width="{bw:.1}" height="{bh:.1}" fill="{color}"/>"#,
            x = x,
            ry = y + 4.0,
            bw = bar,
            bh = ROW_HEIGHT - 8.0,
            color = color
        ));
        svg.push_str(&format!(
            r#"<text x="{vx:.1}" y="{ty:.1}">{sign}{v:.3}</text>"#,
            vx = CHART_WIDTH - 72.0,
            ty = y + ROW_HEIGHT / 2.0 + 4.0,
            sign = if c.contribution >= 0.0 { "+" } else { "" },
            v = c.contribution
        ));
    }
    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::derive;
    use crate::model::LogisticModel;
    use crate::models::FarmerRecord;

    fn row(ndvi: &str, rainfall: &str) -> FeatureRow {
        let record = FarmerRecord {
            phone_number: 1,
            raw_phone_number: "911".to_string(),
            credit_limit: None,
            loan_approval: 0,
            attributes: [
                ("NDVI", ndvi),
                ("Rainfall_mm", rainfall),
                ("Soil_pH", "6.0"),
                ("Distance_to_Market_km", "12"),
                ("Land_Size_acres", "3"),
                ("Crop_Type", "Wheat"),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            defects: Vec::new(),
        };
        derive(&record).unwrap()
    }

    fn explainer() -> ContributionExplainer {
        let model = LogisticModel::from_json_str(
            r#"{"features": ["ndvi", "log_rainfall"], "weights": [3.0, 0.5], "intercept": -2.0}"#,
        )
        .unwrap();
        ContributionExplainer::new(Arc::new(model), Some(50))
    }

    #[test]
    fn test_linear_contributions_match_closed_form() {
        let target = row("0.9", "1200");
        let background = vec![row("0.2", "400"), row("0.4", "800"), target.clone()];
        let explanation = explainer().explain(&target, &background).unwrap();

        let mean_ndvi = (0.2 + 0.4 + 0.9) / 3.0;
        let ndvi = explanation
            .contributions
            .iter()
            .find(|c| c.feature == "ndvi")
            .unwrap();
        assert!((ndvi.contribution - 3.0 * (0.9 - mean_ndvi)).abs() < 1e-9);

        let unused = explanation
            .contributions
            .iter()
            .find(|c| c.feature == "soil_ph_score")
            .unwrap();
        assert!(unused.contribution.abs() < 1e-12);

        // Contributions add up to output minus base for a linear margin.
        let total: f64 = explanation.contributions.iter().map(|c| c.contribution).sum();
        assert!((total - (explanation.model_output - explanation.base_value)).abs() < 1e-9);
    }

    #[test]
    fn test_contributions_sorted_by_magnitude() {
        let target = row("0.9", "1200");
        let background = vec![row("0.1", "100")];
        let explanation = explainer().explain(&target, &background).unwrap();
        let magnitudes: Vec<f64> = explanation
            .contributions
            .iter()
            .map(|c| c.contribution.abs())
            .collect();
        assert!(magnitudes.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(explanation.contributions[0].feature, "ndvi");
    }

    #[test]
    fn test_image_is_base64_svg() {
        let target = row("0.6", "500");
        let explanation = explainer().explain(&target, &[row("0.3", "300")]).unwrap();
        assert_eq!(explanation.media_type, SVG_MEDIA_TYPE);
        let decoded = B64.decode(&explanation.image_base64).unwrap();
        let svg = String::from_utf8(decoded).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("ndvi"));
    }

    #[test]
    fn test_empty_background_is_an_error() {
        let target = row("0.6", "500");
        assert!(matches!(
            explainer().explain(&target, &[]),
            Err(ResolveError::Model(_))
        ));
    }

    #[test]
    fn test_sample_background_respects_limit() {
        let rows: Vec<FeatureRow> = (0..10).map(|i| row(&format!("0.{}", i), "100")).collect();
        let sample = sample_background(&rows, 4);
        assert_eq!(sample.len(), 4);
        assert_eq!(sample[0], &rows[0]);
        assert_eq!(sample_background(&rows, 20).len(), 10);
    }

    #[test]
    fn test_unlimited_explainer_uses_every_background_row() {
        let model: Arc<dyn LoanModel> = Arc::new(
            LogisticModel::from_json_str(
                r#"{"features": ["ndvi"], "weights": [1.0], "intercept": 0.0}"#,
            )
            .unwrap(),
        );
        let rows: Vec<FeatureRow> = (0..10).map(|i| row(&format!("0.{}", i), "100")).collect();
        let target = row("0.9", "100");

        let full = ContributionExplainer::new(model.clone(), None)
            .explain(&target, &rows)
            .unwrap();
        // Mean NDVI over all ten rows is 0.45.
        assert!((full.base_value - 0.45).abs() < 1e-9);

        let sampled = ContributionExplainer::new(model, Some(2))
            .explain(&target, &rows)
            .unwrap();
        assert!((sampled.base_value - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_svg_renders_signed_bars() {
        let contributions = vec![
            FeatureContribution {
                feature: "ndvi".to_string(),
                value: 0.8,
                contribution: 0.5,
            },
            FeatureContribution {
                feature: "log_market_distance".to_string(),
                value: 4.2,
                contribution: -0.25,
            },
        ];
        let svg = render_svg(0.1, 0.35, &contributions);
        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains(POSITIVE_COLOR));
        assert!(svg.contains(NEGATIVE_COLOR));
        assert!(svg.contains("+0.500"));
        assert!(svg.contains("-0.250"));
        assert!(svg.contains("Model output 0.350 (base 0.100)"));
    }

    #[test]
    fn test_explanation_is_deterministic() {
        let target = row("0.7", "900");
        let background = vec![row("0.2", "100"), row("0.5", "1500")];
        let a = explainer().explain(&target, &background).unwrap();
        let b = explainer().explain(&target, &background).unwrap();
        assert_eq!(a, b);
    }
}
