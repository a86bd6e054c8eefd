//! Common category (zone) ids.

pub const ZONES: &[(u32, &str)] = &[
    (1, "Animation"),
    (13, "Anime series"),
    (167, "Chinese animation"),
    (3, "Music"),
    (129, "Dance"),
    (4, "Gaming"),
    (17, "Single-player games"),
    (36, "Knowledge"),
    (188, "Technology"),
    (95, "Digital"),
    (189, "Sports"),
    (190, "Cars"),
    (119, "Life"),
    (191, "Food"),
    (192, "Animals"),
    (193, "Kichiku"),
    (194, "Fashion"),
    (195, "News"),
    (196, "Entertainment"),
    (197, "Film & TV"),
    (198, "Documentary"),
    (199, "Movies"),
    (200, "TV series"),
];

pub fn zone_name(tid: u32) -> Option<&'static str> {
    ZONES.iter().find(|(id, _)| *id == tid).map(|(_, name)| *name)
}
