//! Fixed positions of each field on the printed transit form.
//!
//! Coordinates are PDF points from the bottom-left of an A4 page and match
//! the boxes of the portal's form template.

use crate::core::types::{DocField, DocumentFieldSet};

pub const FONT_SIZE: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wrap {
    pub max_chars: usize,
    pub line_spacing: f32,
}

/// Addresses and districts: 28 characters per line, 8 pt apart.
pub const WRAP_TEXT: Wrap = Wrap {
    max_chars: 28,
    line_spacing: 8.0,
};

/// Names and durations: narrower boxes, 10 pt apart.
pub const WRAP_NAME: Wrap = Wrap {
    max_chars: 22,
    line_spacing: 10.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub field: DocField,
    pub x: f32,
    pub y: f32,
    pub wrap: Option<Wrap>,
}

const fn at(field: DocField, x: f32, y: f32) -> Placement {
    Placement {
        field,
        x,
        y,
        wrap: None,
    }
}

const fn wrapped(field: DocField, x: f32, y: f32, wrap: Wrap) -> Placement {
    Placement {
        field,
        x,
        y,
        wrap: Some(wrap),
    }
}

pub const PLACEMENTS: &[Placement] = &[
    at(DocField::IstpNo, 180.0, 620.0),
    wrapped(
        DocField::TransporterName,
        470.0,
        624.0,
        Wrap {
            max_chars: 15,
            line_spacing: 10.0,
        },
    ),
    at(DocField::TransporterId, 180.0, 595.0),
    at(DocField::TransporterMobile, 470.0, 595.0),
    wrapped(DocField::TransporterAddress, 180.0, 573.5, WRAP_TEXT),
    at(DocField::QtyTransportedCubicMeter, 470.0, 568.0),
    at(DocField::MineralName, 180.0, 540.0),
    at(DocField::DestinationDistrict, 470.0, 540.0),
    at(DocField::DistanceKm, 180.0, 510.0),
    wrapped(DocField::TravelDuration, 470.0, 514.0, WRAP_NAME),
    at(DocField::TransitPassGeneratedOn, 180.0, 480.0),
    at(DocField::TransitPassValidUpto, 470.0, 480.0),
    wrapped(DocField::LoadingFromDistrict, 180.0, 460.0, WRAP_TEXT),
    at(DocField::LoadingFromState, 470.0, 445.0),
    at(DocField::OriginTransitPassNo, 180.0, 405.0),
    at(DocField::OriginTransitPassDate, 470.0, 405.0),
    at(DocField::VehicleNumber, 180.0, 320.0),
    at(DocField::DriverMobile, 395.0, 295.0),
    at(DocField::VehicleType, 395.0, 320.0),
    at(DocField::DriverDlNumber, 180.0, 290.0),
    at(DocField::DriverName, 180.0, 295.0),
];

/// Greedy word wrap: lines hold at most `max_chars` characters (spaces
/// included) and words are never split. A single word longer than the limit
/// gets a line of its own.
pub fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

/// Every line of text to draw, wrapped fields expanded downwards.
pub fn layout_lines(fields: &DocumentFieldSet) -> Vec<TextLine> {
    let mut lines = Vec::new();
    for p in PLACEMENTS {
        let value = fields.get(p.field);
        if value.trim().is_empty() {
            continue;
        }
        match p.wrap {
            Some(wrap) => {
                for (i, text) in wrap_words(value, wrap.max_chars).into_iter().enumerate() {
                    lines.push(TextLine {
                        x: p.x,
                        y: p.y - i as f32 * wrap.line_spacing,
                        text,
                    });
                }
            }
            None => lines.push(TextLine {
                x: p.x,
                y: p.y,
                text: value.trim().to_string(),
            }),
        }
    }
    lines
}
