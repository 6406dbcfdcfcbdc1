use super::*;

fn dot(period: f32, on_application: bool) -> EffectTemplate {
    EffectTemplate::DamageOverTime {
        damage_per_tick: 5,
        period,
        execute_on_application: on_application,
    }
}

#[test]
fn test_stale_handle_removal_is_noop() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(7);

    let handle = effects
        .apply_effect(target, &dot(0.5, false), 1.0, EffectContext::default())
        .expect("applied");
    assert!(effects.remove_effect(handle));
    assert!(!effects.remove_effect(handle)); // второй раз: stale

    // Slot переиспользуется с новым generation, старый handle его не трогает
    let fresh = effects
        .apply_effect(target, &dot(0.5, false), 1.0, EffectContext::default())
        .expect("applied");
    assert_ne!(fresh, handle);
    assert!(!effects.remove_effect(handle));
    assert!(effects.is_active(fresh));
}

#[test]
fn test_tags_follow_effects() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(1);

    let burning = effects
        .apply_effect(target, &dot(0.5, true), 1.0, EffectContext::default())
        .expect("applied");
    assert!(effects.has_tag(target, GameplayTag::Burning));
    assert!(!effects.has_tag(Entity::from_raw(2), GameplayTag::Burning));

    effects.remove_effect(burning);
    assert!(!effects.has_tag(target, GameplayTag::Burning));
}

#[test]
fn test_cooldown_marker_expires() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(3);
    let cooldown = EffectTemplate::Cooldown {
        ability: AbilityKind::Blink,
        duration: 1.0,
    };

    effects.apply_effect(target, &cooldown, 1.0, EffectContext::default());
    assert!(effects.has_tag(target, GameplayTag::Cooldown(AbilityKind::Blink)));
    assert!(!effects.has_tag(target, GameplayTag::Cooldown(AbilityKind::Impulse)));

    effects.advance(0.5);
    assert!(effects.has_tag(target, GameplayTag::Cooldown(AbilityKind::Blink)));

    effects.advance(0.5);
    assert!(!effects.has_tag(target, GameplayTag::Cooldown(AbilityKind::Blink)));
    assert_eq!(effects.active_count(), 0);
}

#[test]
fn test_dot_executes_on_application_then_per_period() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(4);
    effects.apply_effect(target, &dot(0.5, true), 1.0, EffectContext::default());

    // Application tick приходит на первом advance, даже с dt = 0
    let first = effects.advance(0.0);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].kind, ExecutionKind::Damage(5));

    assert!(effects.advance(0.25).is_empty());
    assert_eq!(effects.advance(0.25).len(), 1);
    assert_eq!(effects.advance(1.0).len(), 2);
}

#[test]
fn test_regen_skips_application() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(5);
    let regen = EffectTemplate::EnergyRegen {
        amount: 5.0,
        period: 0.5,
    };
    effects.apply_effect(target, &regen, 1.0, EffectContext::default());

    assert!(effects.advance(0.0).is_empty());
    let executions = effects.advance(0.5);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].kind, ExecutionKind::Energy(5.0));
}

#[test]
fn test_drain_amount_per_period() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(6);
    let drain = EffectTemplate::EnergyDrain {
        per_second: 20.0,
        period: 0.5,
    };
    effects.apply_effect(target, &drain, 1.0, EffectContext::default());

    let executions = effects.advance(0.5);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].kind, ExecutionKind::Energy(-10.0));
}

#[test]
fn test_removed_effect_drops_pending_application() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(8);
    let handle = effects
        .apply_effect(target, &dot(0.5, true), 1.0, EffectContext::default())
        .expect("applied");

    effects.remove_effect(handle);
    assert!(effects.advance(0.0).is_empty());
}

#[test]
fn test_invalid_template_rejected() {
    let mut effects = ActiveEffects::default();
    let target = Entity::from_raw(9);

    assert!(effects
        .apply_effect(target, &dot(0.0, false), 1.0, EffectContext::default())
        .is_none());
    assert!(effects
        .apply_effect(target, &dot(0.5, false), 0.0, EffectContext::default())
        .is_none());
    assert_eq!(effects.active_count(), 0);
}

#[test]
fn test_purge_targets() {
    let mut effects = ActiveEffects::default();
    let alive = Entity::from_raw(10);
    let dead = Entity::from_raw(11);

    effects.apply_effect(alive, &dot(0.5, true), 1.0, EffectContext::default());
    effects.apply_effect(dead, &dot(0.5, true), 1.0, EffectContext::default());

    let purged = effects.purge_targets(|entity| entity == alive);
    assert_eq!(purged, 1);
    assert_eq!(effects.count_for(alive), 1);
    assert_eq!(effects.count_for(dead), 0);
    assert_eq!(effects.advance(0.0).len(), 1);
}
