//! HTML fragments for the wizard panels
//!
//! Every string that may come from a classifier, the user or the enrichment
//! endpoint passes through [`escape_html`] before it is embedded.

use bevid_common::policy::{Assessment, Candidate, PredictionSource};

use crate::services::Enrichment;

pub const INITIAL_TRAIN_STATUS: &str =
    "<em>Upload an image, select a label, then click Save Example.</em>";

pub const INITIAL_TRAIN_STEP_STATUS: &str =
    "<em>Click \"Train Model\" when you have added enough examples (at least 1 per label).</em>";

pub const INITIAL_PRED_STATUS: &str =
    "<em>Upload a beverage photo, then click one of the identify buttons below.</em>";

pub const INITIAL_PRETRAINED_MESSAGE: &str =
    "<em>Run \"Quick Identify\" to see pretrained results.</em>";

pub const INITIAL_KNN_MESSAGE: &str = "<em>Run \"Identify with KNN\" to see custom results.</em>";

pub const SAFETY_NOTICE: &str = r#"<div style="border:2px solid #c0392b;padding:12px;border-radius:6px;margin-top:8px">
  <strong>Safety Notice</strong><br>
  The AI suggests this beverage may <strong>not contain alcohol</strong>, but predictions can be wrong.
  Always check the label, especially if you are under 18 or need to avoid alcohol.<br><br>
  Look for <strong>ABV</strong> (alcohol by volume) on the bottle.
  Any value <strong>above 0.5% ABV</strong> means the drink contains alcohol.
</div>"#;

pub const BLOCKED_NOTICE: &str = r#"<p style="color:#c0392b"><strong>Detailed information is unavailable.</strong>
The model is not confident enough or the beverage appears non-alcoholic.
Please verify using the physical label.</p>"#;

pub const FLAGGED_NOTICE: &str = r#"<div style="border:2px solid #e67e22;padding:12px;border-radius:6px">
  <strong>Result flagged as uncertain.</strong><br>
  We recommend checking the physical label for accurate alcohol content information.
</div>"#;

const WARN_COLOR: &str = "#e67e22";
const OK_COLOR: &str = "#27ae60";

/// Escape text for embedding in HTML element content or attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Confidence as a whole percentage, rounded half away from zero
pub fn percent(confidence: f64) -> i64 {
    if confidence.is_finite() {
        (confidence * 100.0).round() as i64
    } else {
        0
    }
}

fn examples_word(count: usize) -> &'static str {
    if count == 1 {
        "example"
    } else {
        "examples"
    }
}

pub fn no_image_status() -> String {
    format!(
        r#"<span style="color:{WARN_COLOR}">⚠ No image selected. Please upload an image first.</span>"#
    )
}

pub fn saved_status(label: &str, count: usize) -> String {
    format!(
        r#"<span style="color:{OK_COLOR}">✔ Saved as <strong>{}</strong>. {} {} total.</span> Upload another image to add more."#,
        escape_html(label),
        count,
        examples_word(count)
    )
}

pub fn no_examples_status() -> String {
    format!(
        r#"<span style="color:{WARN_COLOR}">⚠ No examples saved yet. Go back to Step 1 and add labeled images before training.</span>"#
    )
}

pub fn trained_status(count: usize) -> String {
    format!(
        r#"<span style="color:{OK_COLOR}">✔ Model trained on {} {}. Move to Step 3 to identify a beverage.</span>"#,
        count,
        examples_word(count)
    )
}

/// Tier banner for one classifier's verdict
pub fn tier_message(assessment: &Assessment) -> String {
    let pct = percent(assessment.confidence);
    let label = escape_html(&assessment.label);

    if assessment.false_negative {
        return format!(
            r#"<p style="color:#c0392b;font-weight:bold">⚠ NON-ALCOHOLIC predicted ({pct}% confidence). Always verify by checking the physical label.</p>"#
        );
    }

    let color = assessment.tier.color().css();
    match assessment.tier {
        bevid_common::ConfidenceTier::High => format!(
            r#"<p style="color:{color};font-weight:bold">✔ High confidence: <em>{label}</em> ({pct}%)</p>"#
        ),
        bevid_common::ConfidenceTier::Moderate => format!(
            r#"<p style="color:{color};font-weight:bold">⚠ Moderate confidence: <em>{label}</em> ({pct}%). Review the chart and confirm the result looks correct.</p>"#
        ),
        bevid_common::ConfidenceTier::Low => format!(
            r#"<p style="color:{color};font-weight:bold">✘ Low confidence ({pct}%). The model is uncertain, check the physical label before relying on this result.</p>"#
        ),
    }
}

/// Ranked candidates with a bar per score
pub fn candidate_list(candidates: &[Candidate]) -> String {
    if candidates.is_empty() {
        return String::new();
    }

    let mut out = String::from(r#"<ul class="candidates">"#);
    for candidate in candidates {
        let pct = percent(candidate.score).clamp(0, 100);
        out.push_str(&format!(
            r#"<li><span style="color:{}"><strong>{}</strong></span> {}% <small>({})</small><div class="bar"><div class="fill" style="width:{}%;background:{}"></div></div></li>"#,
            candidate.tier.color().css(),
            escape_html(&candidate.label),
            pct,
            candidate.tier.display_name(),
            pct,
            candidate.tier.color().css(),
        ));
    }
    out.push_str("</ul>");
    out
}

/// Result panel after an accepted, ungated prediction
pub fn enrichment_panel(
    label: &str,
    confidence: f64,
    source: PredictionSource,
    enrichment: &Enrichment,
) -> String {
    let header = format!(
        "<strong>Classification:</strong> {}<br>\n<strong>Confidence:</strong> {}%<br>\n<strong>Model used:</strong> {}<br><br>",
        escape_html(label),
        percent(confidence),
        source.display_name()
    );

    let body = match enrichment {
        Enrichment::Offline => "<em>LLM enrichment not yet connected. When configured, this will show:</em>\n\
             <ul>\n\
             <li>Beverage category and subcategory</li>\n\
             <li>Typical alcohol content (ABV / proof)</li>\n\
             <li>Cultural background and origin</li>\n\
             <li>Suggested food pairings</li>\n\
             <li>Safe consumption notes</li>\n\
             </ul>"
            .to_string(),
        Enrichment::Generated { model, text } => format!(
            "<div class=\"enrichment\">{}</div>\n<small>Details generated by {}</small>",
            escape_html(text).replace('\n', "<br>\n"),
            escape_html(model)
        ),
    };

    format!(
        "<div style=\"padding:12px;background:#f8f9fa;border-radius:6px\">\n{}\n{}\n</div>",
        header, body
    )
}

/// Result panel when every enrichment model failed
pub fn enrichment_failed_panel(reason: &str) -> String {
    format!(
        r#"<div style="border:2px solid #c0392b;padding:12px;border-radius:6px"><strong>Detailed information could not be retrieved.</strong><br>{}<br>Please verify using the physical label.</div>"#,
        escape_html(reason)
    )
}
