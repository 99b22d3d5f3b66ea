use super::*;

#[test]
fn effect_tag_parses_aliases_and_unknowns() {
    assert_eq!(EffectTag::parse("zoom-blur"), EffectTag::ZoomBlur);
    assert_eq!(EffectTag::parse("ZOOM_BLUR"), EffectTag::ZoomBlur);
    assert_eq!(EffectTag::parse("Meme Fusion"), EffectTag::MemeFusion);
    assert_eq!(EffectTag::parse("deep_fry"), EffectTag::MemeFusion);
    assert_eq!(EffectTag::parse("sparkles"), EffectTag::None);
    for tag in EffectTag::ALL {
        assert_eq!(EffectTag::parse(tag.as_str()), tag);
    }
}

#[test]
fn scene_json_uses_defaults_for_missing_fields() {
    let scene: Scene = serde_json::from_value(serde_json::json!({
        "id": "s1",
        "script": "hello",
        "duration": 3.0,
        "visual_effect": "crt"
    }))
    .unwrap();
    assert_eq!(scene.visual_effect, EffectTag::Crt);
    assert_eq!(scene.transition_in, TransitionTag::Fade);
    assert!(scene.slot(SlotId::A).is_empty());
    assert_eq!(scene.audio_status, AssetStatus::Pending);
}

#[test]
fn null_effect_is_none() {
    let scene: Scene = serde_json::from_value(serde_json::json!({
        "id": "s1", "script": "", "duration": 1.0, "visual_effect": null
    }))
    .unwrap();
    assert_eq!(scene.visual_effect, EffectTag::None);
}

#[test]
fn replace_script_resets_assets_but_keeps_prompts() {
    let mut scene = Scene::new("s1", "old", 4.0)
        .with_image(SlotId::A, "https://x/a.png")
        .with_audio("https://x/a.wav")
        .with_effect(EffectTag::Vhs);
    scene.slot_mut(SlotId::B).prompt = "a skyline".to_string();

    let next = scene.replace_script("new");
    assert_eq!(next.id, "s1");
    assert_eq!(next.script, "new");
    assert_eq!(next.visual_effect, EffectTag::Vhs);
    assert_eq!(next.slot(SlotId::B).prompt, "a skyline");
    assert!(next.slot(SlotId::A).image_url.is_none());
    assert_eq!(next.slot(SlotId::A).image_status, AssetStatus::Pending);
    assert!(next.audio_url.is_none());
}

#[test]
fn validate_rejects_bad_duration_and_duplicate_ids() {
    assert!(Scene::new("a", "", 0.0).validate().is_err());
    assert!(Scene::new("a", "", f64::NAN).validate().is_err());
    assert!(Scene::new(" ", "", 1.0).validate().is_err());
    let scenes = vec![Scene::new("a", "", 1.0), Scene::new("a", "", 2.0)];
    assert!(validate_scenes(&scenes).is_err());
}
