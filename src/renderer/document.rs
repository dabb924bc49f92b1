//! Structured output of a render pass and its HTML serialization.

use html_escape::{encode_double_quoted_attribute, encode_text};

/// One block of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    LineBreak,
    Heading {
        level: u8,
        text: String,
    },
    Paragraph(String),
    Quote(String),
    /// A run of consecutive list lines
    List(Vec<String>),
    /// A whole preformatted block, lines joined with `\n`
    Preformatted {
        alt: Option<String>,
        text: String,
    },
    Link {
        href: String,
        text: String,
        /// Shown next to text-less links to other protocols
        scheme: Option<String>,
    },
    /// Image fetched by us and embedded as a `data:` URI
    Image {
        href: String,
        alt: String,
        data_uri: String,
    },
    /// Image left for the host renderer to fetch
    HostImage {
        href: String,
        alt: String,
    },
    /// Slot filled by a background image task before the render returns
    Pending {
        href: String,
        alt: String,
    },
}

impl Node {
    fn write_html(&self, out: &mut String) {
        match self {
            Node::LineBreak => out.push_str("<br>\n"),
            Node::Heading { level, text } => {
                out.push_str(&format!("<h{0}>{1}</h{0}>\n", level, encode_text(text)));
            }
            Node::Paragraph(text) => {
                out.push_str(&format!("<p>{}</p>\n", encode_text(text)));
            }
            Node::Quote(text) => {
                out.push_str(&format!("<blockquote>{}</blockquote>\n", encode_text(text)));
            }
            Node::List(items) => {
                out.push_str("<ul>\n");
                for item in items {
                    out.push_str(&format!("<li>{}</li>\n", encode_text(item)));
                }
                out.push_str("</ul>\n");
            }
            Node::Preformatted { alt, text } => {
                match alt {
                    Some(alt) => out.push_str(&format!(
                        "<pre aria-label=\"{}\">",
                        encode_double_quoted_attribute(alt)
                    )),
                    None => out.push_str("<pre>"),
                }
                out.push_str(&encode_text(text));
                out.push_str("</pre>\n");
            }
            Node::Link { href, text, scheme } => {
                out.push_str(&format!(
                    "<p class=\"link\"><a href=\"{}\">{}</a>",
                    encode_double_quoted_attribute(href),
                    encode_text(text)
                ));
                if let Some(scheme) = scheme {
                    out.push_str(&format!(
                        " <span class=\"scheme\">[{}]</span>",
                        encode_text(scheme)
                    ));
                }
                out.push_str("</p>\n");
            }
            Node::Image {
                href,
                alt,
                data_uri,
            } => {
                out.push_str(&format!(
                    "<p class=\"image\"><a href=\"{}\"><img src=\"{}\" alt=\"{}\"></a></p>\n",
                    encode_double_quoted_attribute(href),
                    encode_double_quoted_attribute(data_uri),
                    encode_double_quoted_attribute(alt)
                ));
            }
            Node::HostImage { href, alt } => {
                out.push_str(&format!(
                    "<p class=\"image\"><img src=\"{}\" alt=\"{}\"></p>\n",
                    encode_double_quoted_attribute(href),
                    encode_double_quoted_attribute(alt)
                ));
            }
            // Only reachable if a caller serializes mid-render
            Node::Pending { href, alt } => {
                out.push_str(&format!(
                    "<p class=\"image pending\"><a href=\"{}\">{}</a></p>\n",
                    encode_double_quoted_attribute(href),
                    encode_text(alt)
                ));
            }
        }
    }
}

/// Result of rendering one gemtext body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub nodes: Vec<Node>,
    /// Text of the first heading
    pub title: Option<String>,
}

impl Document {
    /// Body markup, without the stylesheet wrapper.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_html(&mut out);
        }
        out
    }
}

/// Wrap a rendered body into a complete page referencing the theme's
/// stylesheet.
pub fn inject_stylesheet(body: &str, title: Option<&str>, theme: &str) -> String {
    let mut out = String::with_capacity(body.len() + 256);
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"theme-{}.css\">\n",
        encode_double_quoted_attribute(theme)
    ));
    if let Some(title) = title {
        out.push_str(&format!("<title>{}</title>\n", encode_text(title)));
    }
    out.push_str("</head>\n<body>\n");
    out.push_str(body);
    out.push_str("</body>\n</html>\n");
    out
}
