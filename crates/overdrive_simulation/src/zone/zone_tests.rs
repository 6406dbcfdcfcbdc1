use super::*;
use crate::effects::{EffectHandle, GameplayTag};
use std::collections::HashMap;

/// Effect service, который считает вызовы
#[derive(Default)]
struct RecordingEffects {
    inner: ActiveEffects,
    applied: Vec<Entity>,
    removed: HashMap<EffectHandle, u32>,
}

impl EffectService for RecordingEffects {
    fn apply_effect(
        &mut self,
        target: Entity,
        template: &EffectTemplate,
        level: f32,
        context: EffectContext,
    ) -> Option<EffectHandle> {
        self.applied.push(target);
        self.inner.apply_effect(target, template, level, context)
    }

    fn remove_effect(&mut self, handle: EffectHandle) -> bool {
        *self.removed.entry(handle).or_default() += 1;
        self.inner.remove_effect(handle)
    }

    fn has_tag(&self, target: Entity, tag: GameplayTag) -> bool {
        self.inner.has_tag(target, tag)
    }
}

fn burning() -> EffectTemplate {
    EffectTemplate::DamageOverTime {
        damage_per_tick: 5,
        period: 0.5,
        execute_on_application: true,
    }
}

fn zone_with_spawner(spawner: Entity) -> DamageZone {
    let mut zone = DamageZone::default();
    zone.initialize(spawner, burning());
    zone
}

#[test]
fn test_double_enter_applies_once() {
    let zone_entity = Entity::from_raw(50);
    let target = Entity::from_raw(2);
    let mut effects = RecordingEffects::default();
    let mut zone = zone_with_spawner(Entity::from_raw(1));

    assert!(zone.on_enter(zone_entity, target, &mut effects));
    assert!(!zone.on_enter(zone_entity, target, &mut effects));

    assert_eq!(effects.applied, vec![target]);
    assert_eq!(zone.occupants().len(), 1);
    assert_eq!(effects.inner.count_for(target), 1);
}

#[test]
fn test_spawner_is_excluded() {
    let spawner = Entity::from_raw(1);
    let mut effects = RecordingEffects::default();
    let mut zone = zone_with_spawner(spawner);

    assert!(!zone.on_enter(Entity::from_raw(50), spawner, &mut effects));
    assert!(effects.applied.is_empty());
    assert!(zone.occupants().is_empty());
}

#[test]
fn test_unset_template_is_noop() {
    let mut effects = RecordingEffects::default();
    let mut zone = DamageZone::default();

    assert!(!zone.on_enter(Entity::from_raw(50), Entity::from_raw(2), &mut effects));
    assert!(effects.applied.is_empty());
}

#[test]
fn test_exit_clears_entry_even_with_stale_handle() {
    let target = Entity::from_raw(2);
    let mut effects = RecordingEffects::default();
    let mut zone = zone_with_spawner(Entity::from_raw(1));
    zone.on_enter(Entity::from_raw(50), target, &mut effects);

    // Эффект уже снят кем-то снаружи (target despawn → purge)
    let handle = zone.occupants().handle_of(target).expect("tracked");
    assert!(effects.inner.remove_effect(handle));

    assert!(zone.on_exit(target, &mut effects));
    assert!(!zone.occupants().contains(target));
    assert_eq!(effects.removed.get(&handle), Some(&1));

    // Повторный exit: ничего не делает
    assert!(!zone.on_exit(target, &mut effects));
    assert_eq!(effects.removed.get(&handle), Some(&1));
}

#[test]
fn test_reenter_after_exit_applies_again() {
    let target = Entity::from_raw(2);
    let mut effects = RecordingEffects::default();
    let mut zone = zone_with_spawner(Entity::from_raw(1));

    zone.on_enter(Entity::from_raw(50), target, &mut effects);
    zone.on_exit(target, &mut effects);
    zone.on_enter(Entity::from_raw(50), target, &mut effects);

    assert_eq!(effects.applied.len(), 2);
    assert_eq!(zone.occupants().len(), 1);
    assert_eq!(effects.inner.count_for(target), 1);
}

#[test]
fn test_teardown_releases_every_handle_once() {
    let zone_entity = Entity::from_raw(50);
    let mut effects = RecordingEffects::default();
    let mut zone = zone_with_spawner(Entity::from_raw(1));

    let targets: Vec<Entity> = (2..7).map(Entity::from_raw).collect();
    for target in &targets {
        zone.on_enter(zone_entity, *target, &mut effects);
    }
    let handles: Vec<EffectHandle> = targets
        .iter()
        .filter_map(|target| zone.occupants().handle_of(*target))
        .collect();
    assert_eq!(handles.len(), targets.len());

    assert_eq!(zone.release_all(&mut effects), targets.len());
    assert!(zone.occupants().is_empty());
    for handle in &handles {
        assert_eq!(effects.removed.get(handle), Some(&1));
    }
    assert_eq!(effects.inner.active_count(), 0);

    // Второй teardown: пусто, ничего не снимается повторно
    assert_eq!(zone.release_all(&mut effects), 0);
    for handle in &handles {
        assert_eq!(effects.removed.get(handle), Some(&1));
    }
}

#[test]
fn test_occupant_keys_are_generational() {
    let mut effects = ActiveEffects::default();
    let mut table = OccupantTable::default();
    let first = Entity::from_raw(2);
    let second = Entity::from_raw(3);

    let handle = effects
        .apply_effect(first, &burning(), 1.0, EffectContext::default())
        .expect("applied");
    let old_key = table.insert(first, handle);
    assert_eq!(table.resolve(old_key), Some(first));

    table.remove(first);
    assert_eq!(table.resolve(old_key), None);

    // Slot переиспользован, старый key не резолвится в нового occupant
    let new_key = table.insert(second, handle);
    assert_ne!(old_key, new_key);
    assert_eq!(table.resolve(old_key), None);
    assert_eq!(table.resolve(new_key), Some(second));
}
