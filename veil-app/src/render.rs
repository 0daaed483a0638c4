//! Unstyled HTML rendering for `format=html`.

use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write;
use veil_common::AggregationResult;

pub fn results_page(result: &AggregationResult) -> String {
    let mut out = String::with_capacity(1024 + result.results.len() * 256);
    let query = encode_text(&result.query);
    let _ = write!(
        out,
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
         <meta name=\"referrer\" content=\"no-referrer\">\
         <title>{query} - veil</title></head><body>\n<h1>{query}</h1>\n"
    );

    if result.results.is_empty() {
        out.push_str("<p>No results.</p>\n");
    } else {
        out.push_str("<ol>\n");
        for r in &result.results {
            let _ = write!(
                out,
                "<li><a href=\"{href}\" rel=\"noreferrer noopener\">{title}</a><br>\
                 <small>{url} · {engine} · {category}</small>",
                href = encode_double_quoted_attribute(&r.url),
                title = encode_text(&r.title),
                url = encode_text(&r.url),
                engine = encode_text(r.engine.as_str()),
                category = r.category.as_str(),
            );
            if !r.content.is_empty() {
                let _ = write!(out, "<p>{}</p>", encode_text(&r.content));
            }
            out.push_str("</li>\n");
        }
        out.push_str("</ol>\n");
    }

    if !result.suggestions.is_empty() {
        out.push_str("<h2>Suggestions</h2>\n<ul>\n");
        for s in &result.suggestions {
            let _ = writeln!(out, "<li>{}</li>", encode_text(s));
        }
        out.push_str("</ul>\n");
    }

    if !result.unresponsive_engines.is_empty() {
        out.push_str("<h2>Unresponsive engines</h2>\n<ul>\n");
        for u in &result.unresponsive_engines {
            let _ = writeln!(
                out,
                "<li>{}: {}</li>",
                encode_text(u.engine.as_str()),
                u.reason.as_str()
            );
        }
        out.push_str("</ul>\n");
    }

    out.push_str("</body></html>\n");
    out
}
