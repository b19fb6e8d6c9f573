use crate::event::RatingEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;

const NOT_AVAILABLE: &str = "N/A";

/// Discord webhook body: a single embed per rating.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationDocument {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

impl NotificationDocument {
    pub fn title(&self) -> &str {
        self.embeds.first().map(|e| e.title.as_str()).unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.embeds
            .first()?
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

pub fn build(event: &RatingEvent, poster_url: Option<&str>) -> NotificationDocument {
    build_at(event, poster_url, Utc::now())
}

pub fn build_at(
    event: &RatingEvent,
    poster_url: Option<&str>,
    now: DateTime<Utc>,
) -> NotificationDocument {
    let fields = vec![
        field(
            "Description",
            event.summary.as_deref().unwrap_or(NOT_AVAILABLE),
            false,
        ),
        field("Rating", &format!("{}/10", event.rating), true),
        field(
            "Audience Rating",
            &event
                .audience_rating
                .map(|r| format!("{r:.1}/10"))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            true,
        ),
        field(
            "View Details",
            event.details_link.as_deref().unwrap_or(NOT_AVAILABLE),
            true,
        ),
    ];

    NotificationDocument {
        embeds: vec![Embed {
            title: format!("{} rated {}!", event.actor_name, event.display_title),
            fields,
            timestamp: minute_timestamp(now),
            image: poster_url.map(image),
            thumbnail: event
                .thumbnail_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .map(image),
        }],
    }
}

fn field(name: &str, value: &str, inline: bool) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline,
    }
}

fn image(url: &str) -> EmbedImage {
    EmbedImage {
        url: url.to_string(),
    }
}

fn minute_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:00.000Z").to_string()
}
