//! Room type detection for upstream entries and mapping to a small set of
//! standard categories.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyCategory {
    EntireHome,
    PrivateRoom,
    SharedRoom,
    Guesthouse,
    Hotel,
    UniqueStay,
    Other,
}

impl PropertyCategory {
    pub fn label(&self) -> &'static str {
        match self {
            PropertyCategory::EntireHome => "Entire home",
            PropertyCategory::PrivateRoom => "Private room",
            PropertyCategory::SharedRoom => "Shared room",
            PropertyCategory::Guesthouse => "Guesthouse",
            PropertyCategory::Hotel => "Hotel",
            PropertyCategory::UniqueStay => "Unique stay",
            PropertyCategory::Other => "Other",
        }
    }

    /// Map a detected or upstream room type onto a category.
    pub fn from_room_type(room_type: &str) -> Self {
        let t = room_type.trim().to_lowercase().replace(['_', '-'], " ");

        // Most specific first: "room in boutique hotel" is a hotel, not a private room
        if t.contains("hotel") || (t.starts_with("room") && t.contains("serviced apartment")) {
            return PropertyCategory::Hotel;
        }
        if t.contains("bed and breakfast") || t.contains("bed & breakfast") || t.contains("guest") {
            return PropertyCategory::Guesthouse;
        }
        if t.starts_with("shared") || t.contains("shared room") {
            return PropertyCategory::SharedRoom;
        }
        if t.starts_with("private room") || t.starts_with("room in") {
            return PropertyCategory::PrivateRoom;
        }
        const UNIQUE: [&str; 14] = [
            "boat", "camper", "rv", "campsite", "tent", "tiny home", "treehouse", "farm stay",
            "nature lodge", "earth home", "yurt", "barn", "unique", "houseboat",
        ];
        let is_unique = |u: &&str| {
            if u.contains(' ') {
                t.contains(*u)
            } else {
                t.split_whitespace().any(|w| w == *u)
            }
        };
        if UNIQUE.iter().any(is_unique) {
            return PropertyCategory::UniqueStay;
        }
        const HOMES: [&str; 16] = [
            "entire", "home", "house", "cabin", "chalet", "cottage", "bungalow", "villa",
            "townhouse", "place", "rental unit", "apartment", "condo", "loft", "flat", "vacation",
        ];
        if HOMES.iter().any(|h| t.contains(h)) {
            return PropertyCategory::EntireHome;
        }
        PropertyCategory::Other
    }
}

/// Detect a room type for a raw upstream entry: explicit category or type
/// fields first, then keywords in the title (Dutch and English).
pub fn detect_room_type(entry: &Value) -> String {
    for field in ["category", "type"] {
        if let Some(value) = entry[field].as_str().filter(|s| !s.trim().is_empty()) {
            return value.trim().to_lowercase().replace(' ', "_");
        }
    }

    let title = entry["title"].as_str().unwrap_or("").to_lowercase();
    let name = entry["name"].as_str().unwrap_or("").to_lowercase();
    detect_from_text(&format!("{} {}", title, name)).to_string()
}

fn detect_from_text(text: &str) -> &'static str {
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
    let has_word = |word: &str| text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word);

    if has(&["camper", "caravan"]) || has_word("rv") {
        "camper_rv"
    } else if has(&["bed and breakfast", "bed & breakfast", "b&b"]) {
        "bed_and_breakfast"
    } else if has(&["boetiekhotel", "boutique hotel", "boutique-hotel"]) {
        "boutique_hotel"
    } else if has(&["hotel"]) {
        "hotel"
    } else if has(&["woonboot", "houseboat", "boat", "boot "]) {
        "houseboat"
    } else if has(&["schuur", "barn"]) {
        "barn"
    } else if has(&["yurt", "joert", " tent ", "tent in ", "camping"]) {
        "tent"
    } else if has(&["gastenverblijf", "gastsuite", "gastensuite", "guesthouse", "guest house", "guest suite"]) {
        "guesthouse"
    } else if has(&["tiny home", "tiny house", "tiny-house"]) {
        "tiny_home"
    } else if has(&["loft"]) {
        "loft"
    } else if has(&["appartement", "apartment", "flat"]) {
        "apartment"
    } else if has(&["villa"]) {
        "villa"
    } else if has(&["bungalow"]) {
        "bungalow"
    } else if has(&["chalet"]) {
        "chalet"
    } else if has(&["cottage", "huisje"]) {
        "cottage"
    } else if has(&["cabin"]) || has_word("hut") {
        "cabin"
    } else if has(&["home in", "vacation home", "holiday home"]) {
        "home"
    } else if has(&["gedeelde kamer", "shared room"]) {
        "shared_room"
    } else if has(&["privékamer", "private room", "room in", "kamer in"]) {
        "private_room"
    } else if has(&["accommodatie", "accommodation"]) {
        "accommodation"
    } else if has(&["huis", "house", "woning"]) {
        "house"
    } else if has(&["entire", "geheel"]) {
        "entire_home"
    } else {
        "unknown"
    }
}
