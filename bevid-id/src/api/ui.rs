//! UI Routes - HTML pages for the bevid-id wizard
//!
//! Pages are rendered from the session on every request. Image upload,
//! feature extraction and both classifiers live in the browser-side toolkit,
//! which posts its results to the JSON API; the pages here show the state
//! those calls produce and follow it live over `/events`.

use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Router,
};
use bevid_common::events::WizardEvent;
use bevid_common::labels::{DEFAULT_LABEL, KNN_LABELS};
use bevid_common::policy::PredictionSource;
use bevid_common::store::{self, TrainingExample};
use chrono::Utc;

use crate::html::{self, escape_html, percent};
use crate::session::{Page, SourcePanel, WizardSession};
use crate::{ApiError, ApiResult, AppState};

const STYLE: &str = r#"
    body {
        font-family: system-ui, -apple-system, sans-serif;
        max-width: 900px;
        margin: 40px auto;
        padding: 20px;
        line-height: 1.6;
    }
    h1 {
        color: #333;
        border-bottom: 2px solid #0066cc;
        padding-bottom: 10px;
    }
    .button {
        display: inline-block;
        padding: 10px 20px;
        background: #0066cc;
        color: white;
        text-decoration: none;
        border: none;
        border-radius: 4px;
        margin: 10px 5px;
        cursor: pointer;
    }
    .button:hover {
        background: #0052a3;
    }
    .progress li.done { color: #27ae60; }
    .progress li.current { font-weight: bold; }
    .panel {
        background: #f5f5f5;
        padding: 16px;
        border-radius: 4px;
        margin: 16px 0;
    }
    .bar { width: 100%; height: 8px; background: #e0e0e0; border-radius: 4px; }
    .fill { height: 100%; border-radius: 4px; }
    table { border-collapse: collapse; }
    td, th { padding: 4px 12px; border-bottom: 1px solid #ddd; text-align: left; }
    img.thumb { width: 48px; height: 48px; object-fit: cover; }
"#;

/// Live updates and button wiring
///
/// `window.bevid` is the hook for the browser-side toolkit:
/// - `saveExample(features, thumbnail)` posts an example under the selected label
/// - `submitPrediction(source, {label, confidences})` posts classifier output
/// - `train()` records a training run
/// - `featureSource` / `classifiers.pretrained` / `classifiers.knn` are set by
///   the toolkit; the page buttons call them and post what they return
const SCRIPT: &str = r#"
    const events = new EventSource('/events');
    events.addEventListener('StatusChanged', (e) => {
        const data = JSON.parse(e.data);
        const el = document.getElementById(data.panel);
        if (el) { el.innerHTML = data.html; }
    });
    events.addEventListener('PageChanged', (e) => {
        const data = JSON.parse(e.data);
        if (String(data.page) !== document.body.dataset.page) {
            window.location.href = '/wizard/' + data.page;
        }
    });
    events.addEventListener('PredictionAssessed', () => {
        if (document.body.dataset.page === '4') { window.location.reload(); }
    });
    async function postJson(url, body) {
        const res = await fetch(url, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify(body || {}),
        });
        return res.json();
    }
    function setStatus(id, html) {
        const el = document.getElementById(id);
        if (el && html !== undefined) { el.innerHTML = html; }
    }
    async function decide(decision) {
        const res = await postJson('/api/decision', { decision });
        if (res.current_page !== undefined) {
            window.location.href = '/wizard/' + res.current_page;
        }
    }
    async function startOver() {
        await postJson('/api/session/reset');
        window.location.href = '/wizard/0';
    }
    window.bevid = {
        featureSource: null,
        classifiers: { pretrained: null, knn: null },
        async saveExample(features, thumbnail) {
            const select = document.getElementById('label-select');
            const label = select ? select.value : 'Whisky';
            const res = await postJson('/api/examples', { features: features || [], label, thumbnail });
            setStatus('train-status', res.status_html);
            return res;
        },
        async train() {
            const res = await postJson('/api/train');
            setStatus('train-step-status', res.status_html);
            return res;
        },
        async submitPrediction(source, prediction) {
            return postJson('/api/predictions', { source, ...prediction });
        },
    };
    function bind(id, handler) {
        const el = document.getElementById(id);
        if (el) { el.addEventListener('click', handler); }
    }
    bind('save-btn', async () => {
        const input = window.bevid.featureSource ? await window.bevid.featureSource() : null;
        await window.bevid.saveExample(input ? input.features : [], input ? input.thumbnail : null);
    });
    bind('train-btn', () => window.bevid.train());
    for (const source of ['pretrained', 'knn']) {
        bind(source + '-btn', async () => {
            const classify = window.bevid.classifiers[source];
            if (!classify) {
                setStatus('pred-status', '<span style="color:#e67e22">⚠ Classifier not loaded yet.</span>');
                return;
            }
            const prediction = await classify();
            if (!prediction) {
                setStatus('pred-status', '<span style="color:#e67e22">⚠ No image selected. Please upload an image first.</span>');
                return;
            }
            await window.bevid.submitPrediction(source, prediction);
        });
    }
"#;

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root_page))
        .route("/wizard/:page", get(wizard_page))
}

/// GET / - welcome page
async fn root_page(State(state): State<AppState>) -> ApiResult<Html<String>> {
    show_page(&state, Page::Welcome).await
}

/// GET /wizard/:page - page by 0-based index
async fn wizard_page(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<Html<String>> {
    let page = Page::from_index(index)
        .ok_or_else(|| ApiError::NotFound(format!("Wizard page {}", index)))?;
    show_page(&state, page).await
}

async fn show_page(state: &AppState, page: Page) -> ApiResult<Html<String>> {
    let examples = state.dataset.list().await?;

    let session = {
        let mut session = state.session.write().await;
        session.current_page = page;
        session.clone()
    };

    state.event_bus.emit_lossy(WizardEvent::PageChanged {
        page: page.index(),
        timestamp: Utc::now(),
    });

    Ok(Html(render_page(page, &session, &examples)))
}

/// Render one wizard page
pub fn render_page(page: Page, session: &WizardSession, examples: &[TrainingExample]) -> String {
    let body = match page {
        Page::Welcome => welcome_body(),
        Page::LabelExamples => label_body(session, examples),
        Page::Train => train_body(session, examples.len()),
        Page::Identify => identify_body(session),
        Page::Review => review_body(session),
        Page::Decide => decide_body(session),
    };

    let mut progress = String::from(r#"<ol class="progress">"#);
    for p in Page::ALL {
        let (class, marker) = if p.index() < page.index() {
            ("done", "✅")
        } else if p == page {
            ("current", "▶")
        } else {
            ("upcoming", "○")
        };
        progress.push_str(&format!(
            r#"<li class="{}">{} <a href="/wizard/{}">{}</a></li>"#,
            class,
            marker,
            p.index(),
            p.short_name()
        ));
    }
    progress.push_str("</ol>");

    let mut nav = String::new();
    if let Some(prev) = page.previous() {
        nav.push_str(&format!(
            r#"<a class="button" href="/wizard/{}">← Back</a>"#,
            prev.index()
        ));
    }
    if let Some(next) = page.next() {
        nav.push_str(&format!(
            r#"<a class="button" href="/wizard/{}">Next →</a>"#,
            next.index()
        ));
    }
    if page != Page::Welcome {
        nav.push_str(r#"<button class="button" onclick="startOver()">Start Over</button>"#);
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - bevid</title>
    <style>{style}</style>
</head>
<body data-page="{index}">
    {progress}
    <h1>{title}</h1>
    {body}
    <p>{nav}</p>
    <p><small>Module: bevid-id v{version}</small></p>
    <script>{script}</script>
</body>
</html>
"#,
        title = page.title(),
        style = STYLE,
        index = page.index(),
        progress = progress,
        body = body,
        nav = nav,
        version = env!("CARGO_PKG_VERSION"),
        script = SCRIPT,
    )
}

fn welcome_body() -> String {
    r#"<p>This app helps you identify unfamiliar alcoholic beverages from photos.
No language skills needed, just upload images.</p>
<p>Two AI models are available:</p>
<ul>
    <li><strong>Quick Identify</strong> uses a pretrained model. It works immediately, no setup.</li>
    <li><strong>Custom KNN</strong> uses your own labeled examples. It is more accurate for specific beverages.</li>
</ul>
<p>Follow the steps to get started.</p>"#
        .to_string()
}

fn label_body(session: &WizardSession, examples: &[TrainingExample]) -> String {
    let options: String = KNN_LABELS
        .iter()
        .map(|label| {
            let selected = if *label == DEFAULT_LABEL { " selected" } else { "" };
            format!(
                r#"<option value="{0}"{1}>{0}</option>"#,
                escape_html(label),
                selected
            )
        })
        .collect();

    let counts = store::label_counts(examples);

    let browser = if examples.is_empty() {
        "<p><em>No examples yet.</em></p>".to_string()
    } else {
        let rows: String = counts
            .iter()
            .map(|(label, count)| {
                let thumbs: String = examples
                    .iter()
                    .filter(|e| e.y == *label)
                    .filter_map(|e| e.thumbnail.as_deref())
                    .filter(|t| t.starts_with("data:image/"))
                    .take(5)
                    .map(|t| format!(r#"<img class="thumb" src="{}" alt="">"#, escape_html(t)))
                    .collect();
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(label),
                    count,
                    thumbs
                )
            })
            .collect();
        format!(
            "<table><tr><th>Label</th><th>Examples</th><th></th></tr>{}</table><p>{} total</p>",
            rows,
            examples.len()
        )
    };

    format!(
        r#"<p>To use the Custom KNN model, upload photos of beverages and label each one.
Add at least 3 photos per label for better accuracy.
Skip this step if you only want to use Quick Identify.</p>
<div id="training-input" class="panel"></div>
<div id="train-status">{status}</div>
<p><select id="label-select">{options}</select>
<button id="save-btn" class="button">Save Example</button></p>
<p><strong>Your labeled examples:</strong></p>
<div id="dataset-browser">{browser}</div>"#,
        status = session.train_status,
        options = options,
        browser = browser,
    )
}

fn train_body(session: &WizardSession, count: usize) -> String {
    let trained = match session.trained_on {
        Some(n) => format!("<p>Last training run used {} examples.</p>", n),
        None => String::new(),
    };

    format!(
        r#"<p>Click "Train Model" to teach the AI using your labeled examples.
Training happens in your browser, no data is sent anywhere.
Skip this step if you only want to use Quick Identify.</p>
<div id="train-step-status">{status}</div>
<p><button id="train-btn" class="button" data-examples="{count}">Train Model</button></p>
{trained}
<div id="training-plot" class="panel"></div>"#,
        status = session.train_step_status,
        count = count,
        trained = trained,
    )
}

fn identify_body(session: &WizardSession) -> String {
    format!(
        r#"<p>Upload a photo of the beverage you want to identify, then choose a model.</p>
<div id="prediction-input" class="panel"></div>
<div id="pred-status">{status}</div>
<p><button id="pretrained-btn" class="button">Quick Identify (Pretrained)</button>
<button id="knn-btn" class="button">Identify with KNN</button></p>"#,
        status = session.pred_status,
    )
}

fn source_section(source: PredictionSource, panel: &SourcePanel) -> String {
    let (heading, subtitle) = match source {
        PredictionSource::Pretrained => (
            "🤖 Pretrained Model (MobileNet / ImageNet)",
            "Instant prediction, no training needed. Uses ImageNet labels.",
        ),
        PredictionSource::Knn => (
            "🎓 Your Custom KNN Model",
            "Trained on your labeled examples. Uses your custom labels.",
        ),
    };

    let candidates = panel
        .assessment
        .as_ref()
        .map(|a| html::candidate_list(&a.candidates))
        .unwrap_or_default();

    format!(
        r#"<hr><strong>{heading}</strong><br><small>{subtitle}</small>
<div id="{id}-candidates">{candidates}</div>
<div id="{id}-tier-message">{tier}</div>
<div id="{id}-warning">{warning}</div>"#,
        heading = heading,
        subtitle = subtitle,
        id = source.as_str(),
        candidates = candidates,
        tier = panel.tier_message,
        warning = panel.warning,
    )
}

fn review_body(session: &WizardSession) -> String {
    format!(
        "<p>Results from both models are shown below. Compare confidence scores and read the messages before deciding.</p>\n{}\n{}",
        source_section(PredictionSource::Pretrained, &session.pretrained),
        source_section(PredictionSource::Knn, &session.knn),
    )
}

fn decide_body(session: &WizardSession) -> String {
    let summary = match &session.latest_prediction {
        Some(latest) => {
            let blocked = session
                .panel(latest.source)
                .assessment
                .as_ref()
                .map(|a| a.blocked)
                .unwrap_or(true);
            let notice = if blocked {
                "<p><em>If you accept this prediction, detailed information will not be shown because the model is not confident enough. You can still see the classification result.</em></p>"
            } else {
                ""
            };
            format!(
                "<p><strong>Top prediction:</strong> {} ({}% confidence, {})</p>{}",
                escape_html(&latest.prediction.label),
                percent(latest.prediction.confidence()),
                latest.source.display_name(),
                notice
            )
        }
        None => "<p><em>No prediction yet. Go back to Step 3 and identify a beverage.</em></p>"
            .to_string(),
    };

    format!(
        r#"<p>Do you accept this prediction?</p>
{summary}
<p><button class="button" onclick="decide('accept')">Accept: Show Details</button>
<button class="button" onclick="decide('retry')">Try Another Photo</button>
<button class="button" onclick="decide('flag')">I'm Not Sure</button></p>
<div id="result-panel">{result}</div>"#,
        summary = summary,
        result = session.result_panel,
    )
}
