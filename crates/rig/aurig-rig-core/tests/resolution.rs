use approx::assert_relative_eq;
use aurig_rig_core::{
    compose::to_unit_quat, parse_profile_json, Axis, AuId, Engine, MappingProfile, MemoryScene,
};
use nalgebra::{UnitQuaternion, Vector3};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn face() -> MappingProfile {
    let json = aurig_test_fixtures::profiles::json("face").expect("load face profile");
    parse_profile_json(&json).expect("parse face profile")
}

fn face_scene() -> MemoryScene {
    let id = [0.0, 0.0, 0.0, 1.0];
    MemoryScene::new()
        .with_bone("HEAD", [0.0, 1.6, 0.0], id)
        .with_bone("JAW", [0.0, -0.05, 0.02], id)
        .with_bone("CHIN", [0.0, -0.1, 0.05], id)
        .with_bone("EYELID_L", [0.03, 0.05, 0.06], id)
        .with_bone("EYELID_R", [-0.03, 0.05, 0.06], id)
        .with_mesh(
            "face",
            &[
                "mouthSmile_L",
                "mouthSmile_R",
                "jawOpen",
                "browInnerUp_L",
                "browInnerUp_R",
                "eyeBlink_L",
                "eyeBlink_R",
            ],
        )
}

fn bound_engine() -> (Engine, MemoryScene) {
    let mut engine = Engine::with_profile(face());
    let mut scene = face_scene();
    engine.bind(&mut scene);
    (engine, scene)
}

#[test]
fn resolve_is_idempotent() {
    let (mut engine, _) = bound_engine();
    for (au, v, b) in [(12, 0.7, Some(-0.3)), (26, 0.5, None), (51, -0.4, None), (45, 1.0, Some(0.2))] {
        let first = engine.resolve(AuId(au), v, b);
        let second = engine.resolve(AuId(au), v, b);
        assert_eq!(first, second, "AU {au}");
    }
}

#[test]
fn set_continuum_drives_exactly_one_member() {
    let (mut engine, _) = bound_engine();
    let (neg, pos) = (AuId(52), AuId(51));

    engine.set_continuum(neg, pos, -0.6, None);
    approx(engine.au_value(neg), 0.6, 1e-6);
    assert_eq!(engine.au_value(pos), 0.0);

    engine.set_continuum(neg, pos, 0.3, None);
    assert_eq!(engine.au_value(neg), 0.0);
    approx(engine.au_value(pos), 0.3, 1e-6);

    engine.set_continuum(neg, pos, 0.0, None);
    assert_eq!(engine.au_value(neg), 0.0);
    assert_eq!(engine.au_value(pos), 0.0);
}

#[test]
fn negative_value_on_pair_member_redirects_to_partner() {
    let (mut engine, _) = bound_engine();
    let res = engine.set_au(AuId(51), -0.5, None);
    assert_eq!(engine.au_value(AuId(51)), 0.0);
    approx(engine.au_value(AuId(52)), 0.5, 1e-6);
    approx(res.axis("HEAD", Axis::Yaw).unwrap(), -0.5, 1e-6);
}

#[test]
fn negative_value_on_unpaired_au_clamps_to_zero() {
    let (mut engine, _) = bound_engine();
    let res = engine.set_au(AuId(12), -0.9, None);
    assert_eq!(engine.au_value(AuId(12)), 0.0);
    assert_eq!(res.morph("mouthSmile_L"), Some(0.0));
}

#[test]
fn smile_with_negative_balance_attenuates_right_side() {
    let (mut engine, mut scene) = bound_engine();
    let res = engine.set_au(AuId(12), 0.8, Some(-0.5));
    approx(res.morph("mouthSmile_L").unwrap(), 0.8, 1e-6);
    approx(res.morph("mouthSmile_R").unwrap(), 0.4, 1e-6);

    engine.update(0.016, &mut scene);
    approx(scene.morph_weight("mouthSmile_L").unwrap(), 0.8, 1e-6);
    approx(scene.morph_weight("mouthSmile_R").unwrap(), 0.4, 1e-6);
}

#[test]
fn full_balance_zeroes_one_side_only() {
    let (mut engine, _) = bound_engine();
    let res = engine.set_au(AuId(1), 0.5, Some(1.0));
    assert_eq!(res.morph("browInnerUp_L"), Some(0.0));
    assert_eq!(res.morph("browInnerUp_R"), Some(0.5));
    let res = engine.set_au(AuId(1), 0.5, Some(-1.0));
    assert_eq!(res.morph("browInnerUp_L"), Some(0.5));
    assert_eq!(res.morph("browInnerUp_R"), Some(0.0));
}

#[test]
fn mixed_jaw_splits_between_morph_and_bone() {
    let (mut engine, mut scene) = bound_engine();
    let res = engine.set_au(AuId(26), 1.0, None);
    approx(res.morph("jawOpen").unwrap(), 0.6, 1e-6);
    assert_eq!(res.axis("JAW", Axis::Pitch), Some(1.0));
    engine.update(0.016, &mut scene);
    let q = to_unit_quat(scene.bone("JAW").unwrap().orientation);
    approx(q.angle(), 25f32.to_radians(), 1e-4);
}

#[test]
fn head_continuum_turns_sixty_degrees_each_way() {
    let (mut engine, mut scene) = bound_engine();
    let yaw = |deg: f32| UnitQuaternion::from_axis_angle(&Vector3::y_axis(), deg.to_radians());

    engine.set_au(AuId(51), 1.0, None);
    engine.update(0.016, &mut scene);
    let q = to_unit_quat(scene.bone("HEAD").unwrap().orientation);
    assert_relative_eq!(q.angle_to(&yaw(60.0)), 0.0, epsilon = 1e-4);

    // AU 52 without resetting 51: axis becomes pos - neg with 51 zeroed
    engine.set_au(AuId(52), 1.0, None);
    assert_eq!(engine.au_value(AuId(51)), 0.0);
    assert_eq!(engine.axis("HEAD", Axis::Yaw), Some(-1.0));
    engine.update(0.016, &mut scene);
    let q = to_unit_quat(scene.bone("HEAD").unwrap().orientation);
    assert_relative_eq!(q.angle_to(&yaw(-60.0)), 0.0, epsilon = 1e-4);
}

#[test]
fn axis_input_order_does_not_change_orientation() {
    let (mut a, mut scene_a) = bound_engine();
    a.set_au(AuId(51), 0.5, None);
    a.set_au(AuId(54), 0.7, None);
    a.update(0.016, &mut scene_a);

    let (mut b, mut scene_b) = bound_engine();
    b.set_au(AuId(54), 0.7, None);
    b.set_au(AuId(51), 0.5, None);
    b.update(0.016, &mut scene_b);

    let qa = to_unit_quat(scene_a.bone("HEAD").unwrap().orientation);
    let qb = to_unit_quat(scene_b.bone("HEAD").unwrap().orientation);
    assert_relative_eq!(qa.angle_to(&qb), 0.0, epsilon = 1e-6);
}

#[test]
fn side_hinted_bone_follows_balance() {
    let (mut engine, mut scene) = bound_engine();
    engine.set_au(AuId(45), 1.0, Some(1.0));
    engine.update(0.016, &mut scene);
    let left = to_unit_quat(scene.bone("EYELID_L").unwrap().orientation);
    let right = to_unit_quat(scene.bone("EYELID_R").unwrap().orientation);
    approx(left.angle(), 0.0, 1e-6);
    approx(right.angle(), 30f32.to_radians(), 1e-4);
}

#[test]
fn translation_binding_offsets_from_snapshot() {
    let (mut engine, mut scene) = bound_engine();
    engine.set_au(AuId(17), 1.0, None);
    engine.update(0.016, &mut scene);
    let chin = scene.bone("CHIN").unwrap();
    approx(chin.position[1], -0.1 + 0.005, 1e-6);
    approx(chin.position[2], 0.05, 1e-6);
}

#[test]
fn missing_bones_and_morphs_are_skipped() {
    let mut engine = Engine::with_profile(face());
    // no EYE_L/EYE_R bones, no mesh with browDown
    let mut scene = face_scene();
    engine.set_au(AuId(61), 1.0, None);
    engine.set_au(AuId(4), 1.0, None);
    let stats = engine.update(0.016, &mut scene);
    assert!(stats.nodes_written >= 1);
    // second tick: nothing dirty, nothing written, no panic
    let stats = engine.update(0.016, &mut scene);
    assert_eq!(stats.nodes_written, 0);
    assert_eq!(stats.morphs_written, 0);
}
