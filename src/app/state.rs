use super::{ComponentState, UmbreldOrchestrator};
use std::collections::HashMap;
use tracing::debug;

impl UmbreldOrchestrator {
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        let previous = self
            .component_states
            .lock()
            .await
            .insert(component.to_string(), state);
        if previous != Some(state) {
            debug!("Component '{}' is now {:?}", component, state);
        }
    }

    pub async fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).copied()
    }

    pub async fn component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }
}
