//! Page shells
//!
//! HTML templates are compiled in and filled by replacing `{{NAME}}`
//! placeholders. Every value is HTML-escaped; the browser-side editor does the
//! rest.

use axum::response::Html;
use calchart_common::db::Show;

const LOGIN_HTML: &str = include_str!("../ui/login.html");
const HOME_HTML: &str = include_str!("../ui/home.html");
const EDITOR_HTML: &str = include_str!("../ui/editor.html");

/// Replace each `{{KEY}}` with its escaped value
///
/// Single pass over the template, so substituted values are never expanded.
/// Unknown placeholders are left as they are.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut html = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        html.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };

        let key = &after[..end];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => html.push_str(&escape_html(value)),
            None => html.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }

    html.push_str(rest);
    html
}

/// Like [`render`], but the value is trusted markup
fn render_raw(html: String, key: &str, markup: &str) -> String {
    html.replace(&format!("{{{{{}}}}}", key), markup)
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub struct LoginPage<'a> {
    pub next: &'a str,
    pub username: &'a str,
    pub error: Option<&'a str>,
    pub members_only: bool,
}

pub fn login_page(page: &LoginPage<'_>) -> Html<String> {
    let html = render(
        LOGIN_HTML,
        &[
            ("NEXT", page.next),
            ("USERNAME", page.username),
            ("ERROR", page.error.unwrap_or("")),
        ],
    );
    let link = if page.members_only {
        format!(
            r#"<p><a href="/login/members-only/?next={}">Log in with Members Only</a></p>"#,
            escape_html(&super::auth::percent_encode(page.next))
        )
    } else {
        String::new()
    };
    Html(render_raw(html, "MEMBERS_ONLY_LINK", &link))
}

pub struct HomePage<'a> {
    pub username: &'a str,
    pub tab: &'a str,
    pub show_band_tab: bool,
    pub is_stunt: bool,
}

pub fn home_page(page: &HomePage<'_>) -> Html<String> {
    let html = render(
        HOME_HTML,
        &[
            ("USERNAME", page.username),
            ("TAB", page.tab),
            ("IS_STUNT", bool_attr(page.is_stunt)),
        ],
    );
    let band_tab = if page.show_band_tab {
        r##"<a href="#" data-tab="band">Band shows</a>"##
    } else {
        ""
    };
    let band_checkbox = if page.is_stunt {
        r#"<label><input type="checkbox" name="is_band" value="true"> Band show</label>"#
    } else {
        ""
    };
    let html = render_raw(html, "BAND_TAB", band_tab);
    Html(render_raw(html, "BAND_CHECKBOX", band_checkbox))
}

pub struct EditorPage<'a> {
    pub show: &'a Show,
    pub audio_url: Option<String>,
    pub download_url: String,
    pub is_local: bool,
}

pub fn editor_page(page: &EditorPage<'_>) -> Html<String> {
    Html(render(
        EDITOR_HTML,
        &[
            ("SHOW_NAME", page.show.name.as_str()),
            ("SHOW_SLUG", page.show.slug.as_str()),
            ("SHOW_PUBLISHED", bool_attr(page.show.published)),
            ("AUDIO_URL", page.audio_url.as_deref().unwrap_or("")),
            ("DOWNLOAD_URL", page.download_url.as_str()),
            ("IS_LOCAL", bool_attr(page.is_local)),
        ],
    ))
}

fn bool_attr(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
