//! Builders for the DOM directives the server sends to the browser.
//!
//! Each builder fills in the directive's type discriminator and its fixed
//! set of map keys. "get*" and `exists` directives are queries: the caller
//! must perform a synchronous receive afterwards ([`crate::session::Session`]
//! wires that up). Everything else is fire-and-forget.

use crate::protocol::Packet;

/// Selector of the scrolling output region in the client page.
pub const OUTPUT: &str = "#msg-list";
/// Selector of the command input element in the client page.
pub const INPUT: &str = "#msg-txt";

/// Append a styled text line to `selector` and scroll it into view.
pub fn append_message(selector: &str, text: &str) -> Packet {
    Packet::directive("appendElement")
        .with("Element", "div")
        .with("Selector", selector)
        .with("Class", "msg")
        .with("Text", text)
        .with("Scroll", "true")
}

/// Append a clickable hyperlink to `selector`, opening in a new tab.
pub fn append_link(selector: &str, href: &str, text: &str) -> Packet {
    Packet::directive("appendElement")
        .with("Element", "a")
        .with("Selector", selector)
        .with("Id", text)
        .with("Class", "ip-link")
        .with("Href", href)
        .with("Text", text)
        .with("Target", "_blank")
        .with("Scroll", "true")
        .with("OnClick", "removeDecoration")
}

/// Append a line break to `selector`.
pub fn append_break(selector: &str) -> Packet {
    Packet::directive("appendElement")
        .with("Element", "br")
        .with("Selector", selector)
        .with("Scroll", "true")
}

/// Move input focus to `selector`.
pub fn focus(selector: &str, value: &str) -> Packet {
    Packet::directive("focus")
        .with("Selector", selector)
        .with("Value", value)
}

/// Query: does an element matching `selector` exist? Reply is `"true"`
/// or `"false"`.
pub fn exists(selector: &str) -> Packet {
    Packet::directive("exists").with("Selector", selector)
}

/// Replace the HTML content of `selector`.
pub fn set_html(selector: &str, value: &str) -> Packet {
    Packet::directive("innerHTML")
        .with("Selector", selector)
        .with("Value", value)
}

/// Query: the current HTML content of `selector`.
pub fn get_html(selector: &str) -> Packet {
    Packet::directive("getHTML").with("Selector", selector)
}

/// Set a DOM attribute on `selector`.
pub fn set_attribute(selector: &str, attribute: &str, value: &str) -> Packet {
    Packet::directive("setAttribute")
        .with("Selector", selector)
        .with("Attribute", attribute)
        .with("Value", value)
}

/// Query: the current value of a DOM attribute on `selector`.
pub fn get_attribute(selector: &str, attribute: &str) -> Packet {
    Packet::directive("getAttribute")
        .with("Selector", selector)
        .with("Attribute", attribute)
}

/// Set a CSS property on `selector`. The property name doubles as the
/// directive type, matching what the client script expects.
pub fn set_property(selector: &str, property: &str, value: &str) -> Packet {
    Packet::directive(property)
        .with("Selector", selector)
        .with("Value", value)
}

/// Query: the computed value of a CSS property on `selector`.
pub fn get_property(selector: &str, property: &str) -> Packet {
    Packet::directive("getProperty")
        .with("Selector", selector)
        .with("Property", property)
}

/// Toggle the contenteditable state of `selector`.
pub fn editable(selector: &str, value: &str) -> Packet {
    Packet::directive("editable")
        .with("Selector", selector)
        .with("Value", value)
}
