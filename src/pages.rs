//! HTML pages for the browser form flow.

use crate::models::{LoanStatus, ResolutionResult};

const PAGE_STYLE: &str = r#"
        body { font-family: sans-serif; max-width: 720px; margin: 40px auto; padding: 0 16px; color: #222; }
        h1 { color: #2e7d32; }
        form { margin: 24px 0; }
        input[type=text] { padding: 8px; width: 260px; }
        button { padding: 8px 16px; background: #2e7d32; color: #fff; border: 0; cursor: pointer; }
        .approved { color: #2e7d32; }
        .rejected { color: #c62828; }
        .muted { color: #666; }
        img { max-width: 100%; border: 1px solid #ddd; margin-top: 12px; }
"#;

/// Escapes text for inclusion in HTML element content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape_html(title),
        style = PAGE_STYLE,
        body = body
    )
}

fn lookup_form(prefill: &str) -> String {
    format!(
        r#"<form method="post" action="/check-loan">
    <label for="phone_number">Registered phone number</label><br>
    <input type="text" id="phone_number" name="phone_number" value="{}" placeholder="10-digit number" required>
    <button type="submit">Check status</button>
</form>"#,
        escape_html(prefill)
    )
}

/// Landing page with the lookup form.
pub fn render_index() -> String {
    layout(
        "TerraCred Loan Status",
        &format!(
            "<h1>TerraCred Loan Status</h1>\n<p class=\"muted\">Enter the phone number registered with your farmer profile.</p>\n{}",
            lookup_form("")
        ),
    )
}

fn bullet_list(heading: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let lis: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", escape_html(item)))
        .collect();
    format!("<h3>{}</h3>\n<ul>{}</ul>\n", escape_html(heading), lis)
}

/// Narrative page for one lookup result.
pub fn render_result(raw_input: &str, result: &ResolutionResult) -> String {
    let phone_label = result
        .phone_number
        .map(|p| p.to_string())
        .unwrap_or_else(|| raw_input.to_string());
    let phone_label = escape_html(&phone_label);

    let mut body = String::from("<h1>TerraCred Loan Status</h1>\n");
    match result.status {
        LoanStatus::Approved => {
            body.push_str(&format!(
                "<h2 class=\"approved\">Congratulations! The loan for {} is approved.</h2>\n",
                phone_label
            ));
            if let Some(limit) = result.credit_limit {
                body.push_str(&format!(
                    "<p>Your sanctioned credit limit is <strong>&#8377;{}</strong>.</p>\n",
                    limit
                ));
            }
        }
        LoanStatus::Rejected => {
            body.push_str(&format!(
                "<h2 class=\"rejected\">We are sorry, the loan for {} was not approved.</h2>\n",
                phone_label
            ));
        }
        LoanStatus::NotFound => {
            body.push_str(&format!(
                "<h2>No farmer is registered with the number {}.</h2>\n<p class=\"muted\">Please check the number and try again.</p>\n",
                phone_label
            ));
        }
        LoanStatus::Error => {
            body.push_str(&format!(
                "<h2 class=\"rejected\">We could not check the status for {}.</h2>\n<p class=\"muted\">{}</p>\n",
                phone_label,
                escape_html(result.message.as_deref().unwrap_or("Unexpected error"))
            ));
        }
    }

    if let Some(ref support) = result.decision_support {
        let empty = Vec::new();
        body.push_str(&bullet_list(
            "What worked in your favour",
            support.top_positive_factors.as_ref().unwrap_or(&empty),
        ));
        body.push_str(&bullet_list(
            "Risks to keep in mind",
            support.risk_factors.as_ref().unwrap_or(&empty),
        ));
        body.push_str(&bullet_list(
            "What held the application back",
            support.limiting_factors.as_ref().unwrap_or(&empty),
        ));
        body.push_str(&bullet_list(
            "How to improve your chances",
            support.improvement_suggestions.as_ref().unwrap_or(&empty),
        ));
    }

    if let Some(ref prediction) = result.prediction {
        body.push_str(&format!(
            "<p class=\"muted\">Model approval probability: {:.1}%</p>\n",
            prediction.probability * 100.0
        ));
    }

    if let Some(ref explanation) = result.explanation {
        body.push_str(&format!(
            "<h3>Why the model scored you this way</h3>\n<img alt=\"Feature contributions\" src=\"data:{};base64,{}\">\n",
            escape_html(&explanation.media_type),
            explanation.image_base64
        ));
    }

    body.push_str("<hr>\n");
    body.push_str(&lookup_form(raw_input));
    layout("TerraCred Loan Status", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResolveError;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#x27;y&#x27;"
        );
    }

    #[test]
    fn test_index_has_form() {
        let html = render_index();
        assert!(html.contains(r#"action="/check-loan""#));
        assert!(html.contains(r#"name="phone_number""#));
    }

    #[test]
    fn test_not_found_page() {
        let html = render_result("1234567890", &ResolutionResult::not_found(1234567890));
        assert!(html.contains("No farmer is registered with the number 1234567890"));
    }

    #[test]
    fn test_error_page_escapes_input() {
        let input = "<b>bad</b>";
        let result = ResolutionResult::error(
            None,
            &ResolveError::InvalidInput {
                input: input.to_string(),
            },
        );
        let html = render_result(input, &result);
        assert!(!html.contains("<b>bad</b>"));
        assert!(html.contains("&lt;b&gt;bad&lt;/b&gt;"));
    }
}
