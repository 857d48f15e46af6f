//! Product variants offered by the storefront

use serde::Serialize;

pub const PRODUCT_NAME: &str = "Coiffeuse Élégante";
pub const PRICE: f64 = 699.00;
pub const CURRENCY: &str = "MAD";

/// Display name used in the order payload when a variant id is unknown
pub const UNKNOWN_VARIANT: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorOption {
    pub id: &'static str,
    pub name: &'static str,
    pub best_seller: bool,
    /// Preview image per mirror style, indexed like `MIRROR_STYLES`
    pub images: [&'static str; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorStyle {
    pub id: &'static str,
    pub name: &'static str,
    pub order: u8,
    pub best_seller: bool,
}

pub static COLORS: [ColorOption; 4] = [
    ColorOption {
        id: "white",
        name: "اللون الابيض",
        best_seller: true,
        images: [
            "https://i.ibb.co/0jPHbnjs/1.png",
            "https://i.ibb.co/9kY1qSmS/2.png",
            "https://i.ibb.co/tpCNnmLy/3.png",
            "https://i.ibb.co/FLgkytTY/4.png",
        ],
    },
    ColorOption {
        id: "black",
        name: "اللون الاسود",
        best_seller: false,
        images: [
            "https://i.ibb.co/wFfzHY37/4.png",
            "https://i.ibb.co/QvXZdqCL/2.png",
            "https://i.ibb.co/sdKvpRhz/1.png",
            "https://i.ibb.co/0V8qz83m/3.png",
        ],
    },
    ColorOption {
        id: "wood",
        name: "اللون الخشبي",
        best_seller: false,
        images: [
            "https://i.ibb.co/sJ6Jf2Fx/1.png",
            "https://i.ibb.co/JWSjL5HZ/2.png",
            "https://i.ibb.co/GfRSY3Pb/3.png",
            "https://i.ibb.co/Vcxfwpsy/4.png",
        ],
    },
    ColorOption {
        id: "brown",
        name: "اللون البني",
        best_seller: false,
        images: [
            "https://i.ibb.co/99y998FS/1.png",
            "https://i.ibb.co/tMx3mnqX/2.png",
            "https://i.ibb.co/gZkXczLp/3.png",
            "https://i.ibb.co/kg30nDMC/4.png",
        ],
    },
];

pub static MIRROR_STYLES: [MirrorStyle; 4] = [
    MirrorStyle { id: "style_1", name: "الشكل 1", order: 1, best_seller: true },
    MirrorStyle { id: "style_2", name: "الشكل 2", order: 2, best_seller: false },
    MirrorStyle { id: "style_3", name: "الشكل 3", order: 3, best_seller: false },
    MirrorStyle { id: "style_4", name: "الشكل 4", order: 4, best_seller: false },
];

pub fn find_color(id: &str) -> Option<&'static ColorOption> {
    COLORS.iter().find(|c| c.id == id)
}

pub fn find_mirror(id: &str) -> Option<&'static MirrorStyle> {
    MIRROR_STYLES.iter().find(|m| m.id == id)
}

/// Preview image of a colour in a given mirror style; the colour's first
/// image when the style is unknown
pub fn preview_image(color: &ColorOption, mirror_id: Option<&str>) -> &'static str {
    mirror_id
        .and_then(|id| MIRROR_STYLES.iter().position(|m| m.id == id))
        .map(|idx| color.images[idx])
        .unwrap_or(color.images[0])
}

pub fn color_name(id: Option<&str>) -> &'static str {
    id.and_then(find_color).map(|c| c.name).unwrap_or(UNKNOWN_VARIANT)
}

pub fn mirror_name(id: Option<&str>) -> &'static str {
    id.and_then(find_mirror).map(|m| m.name).unwrap_or(UNKNOWN_VARIANT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(find_color("wood").unwrap().name, "اللون الخشبي");
        assert_eq!(find_mirror("style_3").unwrap().order, 3);
        assert!(find_color("purple").is_none());
    }

    #[test]
    fn test_unknown_names_resolve_to_placeholder() {
        assert_eq!(color_name(Some("purple")), "N/A");
        assert_eq!(mirror_name(None), "N/A");
        assert_eq!(color_name(Some("white")), "اللون الابيض");
    }

    #[test]
    fn test_preview_image_follows_style() {
        let black = find_color("black").unwrap();
        assert_eq!(preview_image(black, Some("style_2")), "https://i.ibb.co/QvXZdqCL/2.png");
        assert_eq!(preview_image(black, Some("style_9")), black.images[0]);
        assert_eq!(preview_image(black, None), black.images[0]);
    }

    #[test]
    fn test_single_best_seller_per_list() {
        assert_eq!(COLORS.iter().filter(|c| c.best_seller).count(), 1);
        assert_eq!(MIRROR_STYLES.iter().filter(|m| m.best_seller).count(), 1);
    }
}
