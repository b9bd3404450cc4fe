use super::item::{Item, ItemKind, Section};
use super::store::ShootConfig;

/// Builds the wire payload for the generation backend from a configuration
/// snapshot. Pure: works on a deep copy and never touches the caller's state.
///
/// Every image reference in the configuration is assigned one
/// `ATTACHED IMAGE {n}` token from a single global counter, numbered 1-based
/// and contiguous across the whole payload. Sections are walked in the fixed
/// order model, outfits, accessories, environment; items in insertion order;
/// URLs of a multi-angle item in slot order. The backend splices the actual
/// image bytes into those positions, so the numbering is the correlation key.
pub fn build_generation_payload(config: &ShootConfig) -> ShootConfig {
    let mut payload = config.clone();
    let mut next_ref = 1u32;
    for section in Section::ALL {
        for item in payload.section_mut(section) {
            annotate_item(item, &mut next_ref);
        }
    }
    payload
}

fn annotate_item(item: &mut Item, next_ref: &mut u32) {
    if item.kind == ItemKind::FaceAnglesAndBody && item.reference_image_urls.is_some() {
        // The angle URL list stays as-is; the backend needs both the tokens
        // and the real URLs to assemble its mapping.
        let slots = item
            .reference_image_urls
            .as_ref()
            .map(Vec::len)
            .unwrap_or_default();
        let mut tokens = Vec::with_capacity(slots);
        for _ in 0..slots {
            tokens.push(attached_image_token(*next_ref));
            *next_ref += 1;
        }
        item.reference_images = Some(tokens);
    } else if let Some(url) = item
        .reference_image_url
        .clone()
        .filter(|url| !url.is_empty())
    {
        item.reference_image = Some(attached_image_token(*next_ref));
        *next_ref += 1;
        item.reference_image_urls = Some(vec![url]);
    }
    // No image reference: the item passes through untouched, even when it
    // also has no text.
}

fn attached_image_token(n: u32) -> String {
    format!("ATTACHED IMAGE {n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::item::ItemDraft;
    use crate::config::store::ConfigStore;

    fn image_draft(kind: ItemKind, url: &str) -> ItemDraft {
        ItemDraft {
            reference_image_url: Some(url.to_string()),
            ..ItemDraft::new(kind)
        }
    }

    fn multi_angle_draft(urls: &[&str]) -> ItemDraft {
        ItemDraft {
            reference_image_urls: Some(urls.iter().map(|url| url.to_string()).collect()),
            ..ItemDraft::new(ItemKind::FaceAnglesAndBody)
        }
    }

    #[test]
    fn single_and_multi_angle_items_share_one_counter() {
        let mut store = ConfigStore::new();
        store.add_item(Section::Model, image_draft(ItemKind::FaceAndBody, "u1"));
        store.add_item(Section::Outfits, multi_angle_draft(&["u2", "u3"]));

        let payload = build_generation_payload(store.config());

        let model = &payload.model[0];
        assert_eq!(model.reference_image.as_deref(), Some("ATTACHED IMAGE 1"));
        assert_eq!(
            model.reference_image_urls,
            Some(vec!["u1".to_string()])
        );

        let outfit = &payload.outfits[0];
        assert_eq!(
            outfit.reference_images,
            Some(vec![
                "ATTACHED IMAGE 2".to_string(),
                "ATTACHED IMAGE 3".to_string()
            ])
        );
        assert_eq!(
            outfit.reference_image_urls,
            Some(vec!["u2".to_string(), "u3".to_string()])
        );
    }

    #[test]
    fn numbering_is_contiguous_across_sections_in_fixed_order() {
        let mut store = ConfigStore::new();
        store.add_item(Section::Environment, image_draft(ItemKind::Background, "e1"));
        store.add_item(Section::Accessories, image_draft(ItemKind::Bag, "a1"));
        store.add_item(Section::Model, multi_angle_draft(&["m1", "m2", "m3"]));
        store.add_item(Section::Outfits, image_draft(ItemKind::Dress, "o1"));

        let payload = build_generation_payload(store.config());

        // model first regardless of creation order, then outfits,
        // accessories, environment
        assert_eq!(
            payload.model[0].reference_images,
            Some(vec![
                "ATTACHED IMAGE 1".to_string(),
                "ATTACHED IMAGE 2".to_string(),
                "ATTACHED IMAGE 3".to_string()
            ])
        );
        assert_eq!(
            payload.outfits[0].reference_image.as_deref(),
            Some("ATTACHED IMAGE 4")
        );
        assert_eq!(
            payload.accessories[0].reference_image.as_deref(),
            Some("ATTACHED IMAGE 5")
        );
        assert_eq!(
            payload.environment[0].reference_image.as_deref(),
            Some("ATTACHED IMAGE 6")
        );
    }

    #[test]
    fn transform_does_not_mutate_the_input() {
        let mut store = ConfigStore::new();
        store.add_item(Section::Model, multi_angle_draft(&["u1", "u2"]));
        store.add_item(Section::Outfits, image_draft(ItemKind::Top, "u3"));
        let before = store.config().clone();

        let _ = build_generation_payload(store.config());

        assert_eq!(store.config(), &before);
        assert!(store.config().model[0].reference_images.is_none());
        assert!(store.config().outfits[0].reference_image.is_none());
    }

    #[test]
    fn items_without_images_pass_through_unchanged() {
        let mut store = ConfigStore::new();
        store.add_item(
            Section::Environment,
            ItemDraft {
                text: "soft warm lighting".to_string(),
                ..ItemDraft::new(ItemKind::Lighting)
            },
        );
        // violates the text-or-image rule; the transformer must tolerate it
        store.add_item(Section::Accessories, ItemDraft::new(ItemKind::Other));

        let payload = build_generation_payload(store.config());

        assert_eq!(payload.environment[0], store.config().environment[0]);
        assert_eq!(payload.accessories[0], store.config().accessories[0]);
    }

    #[test]
    fn empty_single_url_consumes_no_token() {
        let mut store = ConfigStore::new();
        store.add_item(Section::Outfits, image_draft(ItemKind::Skirt, ""));
        store.add_item(Section::Outfits, image_draft(ItemKind::Shoes, "u1"));

        let payload = build_generation_payload(store.config());

        assert!(payload.outfits[0].reference_image.is_none());
        assert_eq!(
            payload.outfits[1].reference_image.as_deref(),
            Some("ATTACHED IMAGE 1")
        );
    }

    #[test]
    fn token_count_matches_total_urls() {
        let mut store = ConfigStore::new();
        store.add_item(
            Section::Model,
            multi_angle_draft(&["m1", "m2", "m3", "m4", "m5", "m6"]),
        );
        store.add_item(Section::Model, image_draft(ItemKind::Hair, "h1"));
        store.add_item(Section::Accessories, image_draft(ItemKind::Hat, "a1"));

        let payload = build_generation_payload(store.config());
        let raw = serde_json::to_string(&payload).expect("serialize");

        for n in 1..=8 {
            let token = format!("ATTACHED IMAGE {n}");
            assert_eq!(
                raw.matches(token.as_str()).count(),
                1,
                "token {token} should appear exactly once"
            );
        }
        assert!(!raw.contains("ATTACHED IMAGE 9"));
    }
}
