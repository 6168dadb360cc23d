use crate::ingest::{ImageExtension, SAMPLE_PREFIX};
use ammonia::clean_text;
use fruit_detection::DetectionResult;
use std::{fmt::Write as _, path::Path};

const STYLE: &str = r#"
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; background: #f4f6f1; color: #2d3a2e; }
        main { max-width: 880px; margin: 0 auto; padding: 32px 20px; }
        h1 { margin-top: 0; }
        form, .card { background: white; border-radius: 12px; padding: 20px; margin-bottom: 20px; box-shadow: 0 2px 8px rgba(0,0,0,0.08); }
        label { display: block; margin: 10px 0 4px; font-weight: 600; }
        input[type=text] { width: 100%; padding: 8px; box-sizing: border-box; }
        button { margin-top: 14px; padding: 10px 18px; border: 0; border-radius: 8px; background: #4c8c3a; color: white; cursor: pointer; }
        .error { background: #fdecea; color: #8a1f11; border-radius: 8px; padding: 12px 16px; margin-bottom: 20px; }
        .samples { display: flex; flex-wrap: wrap; gap: 10px; }
        .samples button { background: none; padding: 0; margin: 0; border: 2px solid transparent; }
        .samples img { width: 110px; height: 110px; object-fit: cover; border-radius: 8px; display: block; }
        .label { font-size: 1.6em; font-weight: 700; }
        .annotated { max-width: 100%; border-radius: 8px; margin-top: 12px; }
        table { border-collapse: collapse; width: 100%; margin-top: 12px; }
        th, td { text-align: left; padding: 6px 8px; border-bottom: 1px solid #e3e7df; }
"#;

/// What the index page shows besides the upload form.
#[derive(Default)]
pub struct PageView<'a> {
    pub result: Option<&'a DetectionResult>,
    pub error: Option<&'a str>,
    pub samples: &'a [String],
}

pub fn render(view: &PageView<'_>) -> String {
    let mut body = String::new();

    if let Some(error) = view.error {
        let _ = write!(body, r#"<div class="error">{}</div>"#, clean_text(error));
    }

    body.push_str(
        r#"<form method="post" action="/" enctype="multipart/form-data">
            <label for="image">Upload an image</label>
            <input type="file" id="image" name="image" accept=".jpg,.jpeg,.png,.bmp,.webp">
            <label for="image_url">or paste an image URL</label>
            <input type="text" id="image_url" name="image_url" placeholder="https://...">
            <button type="submit">Detect</button>
        </form>"#,
    );

    if !view.samples.is_empty() {
        body.push_str(r#"<div class="card"><h2>Try a sample</h2><div class="samples">"#);
        for sample in view.samples {
            let src = clean_text(&format!("{}{}", SAMPLE_PREFIX, sample));
            let _ = write!(
                body,
                r#"<form method="post" action="/" enctype="multipart/form-data" style="padding:0;box-shadow:none;margin:0">
                    <input type="hidden" name="image_url" value="{src}">
                    <button type="submit" title="{name}"><img src="{src}" alt="{name}"></button>
                </form>"#,
                src = src,
                name = clean_text(sample),
            );
        }
        body.push_str("</div></div>");
    }

    if let Some(result) = view.result {
        body.push_str(&render_result(result));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Fruit Detector</title>
    <style>{}</style>
</head>
<body>
<main>
    <h1>Fruit Detector</h1>
    {}
</main>
</body>
</html>"#,
        STYLE, body
    )
}

fn render_result(result: &DetectionResult) -> String {
    let mut html = String::from(r#"<div class="card result"><h2>Result</h2>"#);
    let _ = write!(html, r#"<div class="label">{}</div>"#, clean_text(result.label()));

    if !result.counts().is_empty() {
        let counts: Vec<String> = result
            .counts()
            .iter()
            .map(|(name, count)| format!("{}: {}", clean_text(name), count))
            .collect();
        let _ = write!(html, "<p>{}</p>", counts.join(", "));
    }

    if let Some(path) = result.annotated_image() {
        let _ = write!(
            html,
            r#"<img class="annotated" src="{}" alt="annotated result">"#,
            clean_text(path)
        );
    }

    if !result.detections().is_empty() {
        html.push_str("<table><tr><th>Class</th><th>Confidence</th><th>Box (x1, y1, x2, y2)</th></tr>");
        for detection in result.detections() {
            let [x1, y1, x2, y2] = detection.box_xyxy;
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{:.2}</td><td>{:.0}, {:.0}, {:.0}, {:.0}</td></tr>",
                clean_text(&detection.class_name),
                detection.confidence,
                x1,
                y1,
                x2,
                y2
            );
        }
        html.push_str("</table>");
    }

    html.push_str("</div>");
    html
}

/// Names of the bundled sample images, sorted. A missing directory means no
/// samples.
pub async fn list_samples(samples_dir: &Path) -> Vec<String> {
    let mut samples = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(samples_dir).await else {
        return samples;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(name) = entry.file_name().to_str() {
            if ImageExtension::from_file_name(name).is_some() {
                samples.push(name.to_string());
            }
        }
    }
    samples.sort();
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use fruit_detection::{Detection, LabelRule};

    #[test]
    fn test_empty_page_has_form() {
        let html = render(&PageView::default());
        assert!(html.contains(r#"name="image""#));
        assert!(html.contains(r#"name="image_url""#));
        assert!(!html.contains(r#"class="error""#));
    }

    #[test]
    fn test_error_is_escaped() {
        let html = render(&PageView {
            error: Some("<script>alert(1)</script>"),
            ..PageView::default()
        });
        assert!(html.contains(r#"class="error""#));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_result_is_rendered() {
        let result = DetectionResult::new(
            vec![Detection {
                class_id: 1,
                class_name: "banana".into(),
                confidence: 0.87,
                box_xyxy: [1.0, 2.0, 30.0, 40.0],
            }],
            LabelRule::HighestConfidence,
        )
        .with_annotated_image(Some("/static/outputs/abc_pred.jpg".into()));

        let html = render(&PageView {
            result: Some(&result),
            ..PageView::default()
        });
        assert!(html.contains("banana: 1"));
        assert!(html.contains("0.87"));
        assert!(html.contains("abc_pred.jpg"));
    }

    #[tokio::test]
    async fn test_list_samples() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        assert_eq!(list_samples(dir.path()).await, vec!["a.jpg", "b.png"]);
        assert!(list_samples(&dir.path().join("missing")).await.is_empty());
    }
}
