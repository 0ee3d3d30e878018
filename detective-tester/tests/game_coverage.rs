#[path = "../../detective-game/tests/bundled_missions.rs"]
mod bundled_missions;

#[path = "../../detective-game/tests/grading_properties.rs"]
mod grading_properties;
