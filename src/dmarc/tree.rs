use xml::reader::{EventReader, XmlEvent};

/// An XML element with its child elements and concatenated text.
/// Attributes, comments and processing instructions are dropped.
#[derive(Debug, Default)]
pub struct Element {
	pub name: String,
	pub children: Vec<Element>,
	pub text: String
}

/// Parses a whole document into its root element.
pub fn parse(document: &str) -> Result<Element, String> {
	let reader = EventReader::from_str(document);
	let mut stack: Vec<Element> = Vec::new();
	let mut root: Option<Element> = None;

	for event in reader {
		match event.map_err(|e| e.to_string())? {
			XmlEvent::StartElement { name, .. } => {
				if root.is_some() {
					return Err(format!("second root element <{}>", name.local_name));
				}
				stack.push(Element { name: name.local_name, ..Element::default() });
			},
			XmlEvent::EndElement { .. } => {
				let element = stack.pop().ok_or("unbalanced end tag")?;
				match stack.last_mut() {
					Some(parent) => parent.children.push(element),
					None => root = Some(element),
				}
			},
			XmlEvent::Characters(text) | XmlEvent::CData(text) => {
				match stack.last_mut() {
					Some(element) => element.text.push_str(&text),
					None => return Err(format!("text outside of the root element: '{}'", text.trim())),
				}
			},
			XmlEvent::Whitespace(text) => {
				if let Some(element) = stack.last_mut() {
					element.text.push_str(&text);
				}
			},
			XmlEvent::EndDocument => break,
			_ => {},
		}
	}

	root.ok_or_else(|| "no root element".to_string())
}
