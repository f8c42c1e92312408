use axum::response::Html;
use lazy_static::lazy_static;
use minijinja::Environment;

use crate::error::AppError;

const TEMPLATE_SOURCES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("secrets.html", include_str!("../templates/secrets.html")),
    ("submit.html", include_str!("../templates/submit.html")),
    ("error.html", include_str!("../templates/error.html")),
];

lazy_static! {
    // `.html` names get auto-escaping, which secrets rely on.
    static ref TEMPLATES: Environment<'static> = {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATE_SOURCES {
            env.add_template(name, source).unwrap();
        }
        env
    };
}

pub fn render<S: serde::Serialize>(name: &str, ctx: S) -> Result<Html<String>, AppError> {
    let html = TEMPLATES
        .get_template(name)
        .and_then(|t| t.render(ctx))
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context(format!("render {name}"))))?;
    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn all_templates_render() {
        for (name, _) in TEMPLATE_SOURCES {
            if *name == "base.html" {
                continue;
            }
            let ctx = context! {
                signed_in => false,
                google_enabled => true,
                secrets => Vec::<String>::new(),
                status => 500,
                message => "boom",
            };
            render(name, ctx).unwrap_or_else(|e| panic!("{name} failed: {e}"));
        }
    }

    #[test]
    fn secrets_are_escaped() {
        let Html(page) = render(
            "secrets.html",
            context! { signed_in => true, secrets => vec!["<script>alert(1)</script>"] },
        )
        .unwrap();
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn form_error_is_shown() {
        let Html(page) = render(
            "login.html",
            context! { error => "Invalid username or password", username => "alice" },
        )
        .unwrap();
        assert!(page.contains("Invalid username or password"));
        assert!(page.contains("value=\"alice\""));
    }

    #[test]
    fn unknown_template_is_internal_error() {
        let err = render("nope.html", context! {}).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
