use serde::{Deserialize, Serialize};

/// Collection wrapper returned by the backing service's list and search
/// endpoints, shaped like a HAL resource:
/// `{"_embedded": {"reservations": [..]}, "_links": {"self": {"href": ".."}}}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Resources<T> {
    #[serde(rename = "_embedded", default = "Embedded::empty")]
    embedded: Embedded<T>,
    #[serde(rename = "_links", default)]
    links: Links,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Embedded<T> {
    #[serde(default = "Vec::new")]
    reservations: Vec<T>,
}

impl<T> Embedded<T> {
    fn empty() -> Self {
        Self { reservations: Vec::new() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Links {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Link {
    pub href: String,
}

impl<T> Resources<T> {
    pub fn new(content: Vec<T>, self_href: impl Into<String>) -> Self {
        Self {
            embedded: Embedded { reservations: content },
            links: Links {
                self_link: Some(Link { href: self_href.into() }),
            },
        }
    }

    pub fn content(&self) -> &[T] {
        &self.embedded.reservations
    }

    pub fn into_content(self) -> Vec<T> {
        self.embedded.reservations
    }

    pub fn links(&self) -> &Links {
        &self.links
    }
}
