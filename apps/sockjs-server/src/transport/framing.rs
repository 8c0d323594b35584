//! Per-transport wrapping of frames into HTTP response bytes.

use std::collections::HashMap;

use sockjs_common::escape::escape_javascript;
use sockjs_common::Frame;

use crate::error::SockJsError;

/// Streaming transports send this much padding before the first frame so
/// browsers start handing chunks to script.
const XHR_STREAMING_PRELUDE_LEN: usize = 2048;

const MAX_CALLBACK_LEN: usize = 32;

const CALLBACK_PLACEHOLDER: &str = "{{ callback }}";

const HTMLFILE_TEMPLATE: &str = concat!(
    "<!doctype html>\n",
    "<html><head>\n",
    "  <meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\" />\n",
    "  <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n",
    "</head><body><h2>Don't panic!</h2>\n",
    "  <script>\n",
    "    document.domain = document.domain;\n",
    "    var c = parent.{{ callback }};\n",
    "    c.start();\n",
    "    function p(d) {c.message(d);};\n",
    "    window.onload = function() {c.stop();};\n",
    "  </script>",
);

/// The HTML page is padded to at least this many bytes, not counting the
/// callback name.
const HTMLFILE_MIN_LEN: usize = 1024;

/// How frames are laid out on one receiving HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    Xhr,
    XhrStreaming,
    EventSource,
    HtmlFile { callback: String },
    Jsonp { callback: String },
}

impl Framing {
    /// Transport name as it appears in the URL.
    pub fn name(&self) -> &'static str {
        match self {
            Framing::Xhr => "xhr",
            Framing::XhrStreaming => "xhr_streaming",
            Framing::EventSource => "eventsource",
            Framing::HtmlFile { .. } => "htmlfile",
            Framing::Jsonp { .. } => "jsonp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Framing::Xhr | Framing::XhrStreaming | Framing::Jsonp { .. } => {
                "application/javascript; charset=UTF-8"
            }
            Framing::EventSource => "text/event-stream",
            Framing::HtmlFile { .. } => "text/html; charset=UTF-8",
        }
    }

    /// Streaming responses stay open across frames; polling responses end
    /// after one.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Framing::XhrStreaming | Framing::EventSource | Framing::HtmlFile { .. }
        )
    }

    /// Bytes written before any frame.
    pub fn prelude(&self) -> Option<String> {
        match self {
            Framing::XhrStreaming => {
                let mut prelude = "h".repeat(XHR_STREAMING_PRELUDE_LEN);
                prelude.push('\n');
                Some(prelude)
            }
            Framing::EventSource => Some("\r\n".to_string()),
            Framing::HtmlFile { callback } => Some(htmlfile_page(callback)),
            Framing::Xhr | Framing::Jsonp { .. } => None,
        }
    }

    /// Wrap one frame for this transport.
    pub fn wrap(&self, frame: &Frame) -> String {
        let encoded = frame.encode();
        match self {
            Framing::Xhr | Framing::XhrStreaming => format!("{encoded}\n"),
            Framing::EventSource => format!("data: {encoded}\r\n\r\n"),
            Framing::HtmlFile { .. } => {
                format!("<script>\np(\"{}\");\n</script>\r\n", escape_javascript(&encoded))
            }
            Framing::Jsonp { callback } => {
                format!("/**/{callback}(\"{}\");\r\n", escape_javascript(&encoded))
            }
        }
    }
}

fn htmlfile_page(callback: &str) -> String {
    let bare_len = HTMLFILE_TEMPLATE.len() - CALLBACK_PLACEHOLDER.len();
    let mut page = HTMLFILE_TEMPLATE.replace(CALLBACK_PLACEHOLDER, callback);
    page.push_str(&" ".repeat(HTMLFILE_MIN_LEN.saturating_sub(bare_len)));
    page.push_str("\r\n");
    page
}

/// Pull the JSONP callback name out of the `c` (or `callback`) query
/// parameter.
pub fn callback_param(query: &HashMap<String, String>) -> Result<String, SockJsError> {
    let callback = query
        .get("c")
        .or_else(|| query.get("callback"))
        .filter(|c| !c.is_empty())
        .ok_or(SockJsError::MissingCallback)?;

    let valid = callback.len() <= MAX_CALLBACK_LEN
        && callback
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(SockJsError::InvalidCallback);
    }
    Ok(callback.clone())
}
