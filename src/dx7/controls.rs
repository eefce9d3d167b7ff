//! Controller routing
//!
//! Control changes are mapped onto synth parameters through configurable
//! curves. The current value of every mapped parameter lives in
//! [`ControlState`] and is sent with every new voice.

use std::collections::BTreeMap;

use crate::config::{default_controls, ControlConfig};
use crate::engine::ParamMap;
use crate::mapping::{self, Mapper};

/// Current value of every routed parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    values: ParamMap,
}

impl ControlState {
    pub fn get(&self, param: &str) -> Option<f32> {
        self.values.get(param).copied()
    }

    pub fn set(&mut self, param: &str, value: f32) {
        self.values.insert(param.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copy of every value, for sending to the engine
    pub fn snapshot(&self) -> ParamMap {
        self.values.clone()
    }
}

struct Route {
    mapper: Box<dyn Mapper>,
    default: f32,
}

/// Maps control change numbers to parameters
pub struct ControlRouter {
    routes: BTreeMap<u8, Route>,
}

impl Default for ControlRouter {
    fn default() -> Self {
        Self::new(&default_controls())
    }
}

impl ControlRouter {
    pub fn new(controls: &[ControlConfig]) -> Self {
        let routes = controls
            .iter()
            .map(|c| {
                let route = Route {
                    mapper: mapping::for_curve(&c.curve, &c.param, c.min, c.max),
                    default: c.default as f32,
                };
                (c.cc, route)
            })
            .collect();
        Self { routes }
    }

    /// State holding each routed parameter at its default
    pub fn initial_state(&self) -> ControlState {
        let mut state = ControlState::default();
        for route in self.routes.values() {
            state.set(route.mapper.name(), route.default);
        }
        state
    }

    /// Parameter a controller is routed to
    pub fn param(&self, num: u8) -> Option<&str> {
        self.routes.get(&num).map(|r| r.mapper.name())
    }

    /// Value the controller maps to, without touching any state
    pub fn map(&self, num: u8, value: u8) -> Option<(&str, f32)> {
        let route = self.routes.get(&num)?;
        Some((route.mapper.name(), route.mapper.map_midi(value)))
    }

    /// Update `state` for a control change; false if `num` is not routed
    pub fn apply(&self, state: &mut ControlState, num: u8, value: u8) -> bool {
        match self.map(num, value) {
            Some((param, mapped)) => {
                log::debug!("cc {} = {} -> {} = {}", num, value, param, mapped);
                state.set(param, mapped);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurveKind;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= b.abs() * 1e-5 + 1e-7
    }

    #[test]
    fn test_default_state() {
        let state = ControlRouter::default().initial_state();
        assert_eq!(state.get("op1amt"), Some(0.0));
        assert_eq!(state.get("op2freqscale"), Some(1.0));
        assert_eq!(state.get("op2decay"), Some(0.3));
        assert_eq!(state.get("op2sustain"), Some(0.5));
        assert_eq!(state.iter().count(), 4);
    }

    #[test]
    fn test_default_table_ranges() {
        let router = ControlRouter::default();
        let mut state = router.initial_state();

        assert!(router.apply(&mut state, 107, 127));
        assert!(close(state.get("op2freqscale").unwrap(), 4.0));
        assert!(router.apply(&mut state, 107, 0));
        assert!(close(state.get("op2freqscale").unwrap(), 1.0 / 256.0));

        assert!(router.apply(&mut state, 108, 0));
        assert!(close(state.get("op2decay").unwrap(), 0.0001));
        assert!(router.apply(&mut state, 108, 127));
        assert!(close(state.get("op2decay").unwrap(), 10.0));

        assert!(router.apply(&mut state, 106, 127));
        assert!(close(state.get("op1amt").unwrap(), 2000.0));
        assert!(router.apply(&mut state, 109, 127));
        assert!(close(state.get("op2sustain").unwrap(), 1.0));
    }

    #[test]
    fn test_unknown_controller() {
        let router = ControlRouter::default();
        let mut state = router.initial_state();
        let before = state.clone();

        assert!(!router.apply(&mut state, 1, 64));
        assert_eq!(state, before);
        assert_eq!(router.param(1), None);
        assert_eq!(router.param(106), Some("op1amt"));
    }

    #[test]
    fn test_custom_table() {
        let router = ControlRouter::new(&[ControlConfig::new(
            74,
            "op3freqscale",
            CurveKind::Octaves,
            -1.0,
            1.0,
            1.0,
        )]);
        let mut state = router.initial_state();
        assert_eq!(state.get("op3freqscale"), Some(1.0));

        assert!(router.apply(&mut state, 74, 127));
        assert!(close(state.get("op3freqscale").unwrap(), 2.0));
        assert!(!router.apply(&mut state, 106, 127));
    }
}
