use crate::CloudProvider;
use anyhow::Result;
use async_trait::async_trait;
use ldapbake_common::{Image, ImageState, Instance, InstanceState, LaunchSpec};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Control-plane call as observed by the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    RunInstance { base_image: String },
    DescribeInstance { instance_id: String },
    CreateImage { instance_id: String, name: String },
    DescribeImage { image_id: String },
    TagResource { resource_id: String, key: String, value: String },
    TerminateInstance { instance_id: String },
}

/// Operation the mock can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    RunInstance,
    DescribeInstance,
    CreateImage,
    DescribeImage,
    TagResource,
    TerminateInstance,
}

struct MockState {
    instance_states: VecDeque<InstanceState>,
    image_states: VecDeque<ImageState>,
    image_name: Option<String>,
    image_description: Option<String>,
    terminated: bool,
    fail_on: Vec<MockOp>,
    calls: Vec<ProviderCall>,
}

/// In-memory provider replaying scripted state sequences.
///
/// Each describe pops the next scripted state; once one state is left it is
/// repeated forever. The first instance state is the one returned by
/// `run_instance`.
pub struct MockProvider {
    instance_id: String,
    image_id: String,
    public_ip: Option<String>,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            instance_id: "i-mock0001".to_string(),
            image_id: "ami-mock0001".to_string(),
            public_ip: Some("203.0.113.10".to_string()),
            state: Mutex::new(MockState {
                instance_states: VecDeque::from(vec![InstanceState::Running]),
                image_states: VecDeque::from(vec![ImageState::Available]),
                image_name: None,
                image_description: None,
                terminated: false,
                fail_on: vec![],
                calls: vec![],
            }),
        }
    }

    pub fn with_instance_states<I: IntoIterator<Item = InstanceState>>(self, states: I) -> Self {
        self.lock().instance_states = states.into_iter().collect();
        self
    }

    pub fn with_image_states<I: IntoIterator<Item = ImageState>>(self, states: I) -> Self {
        self.lock().image_states = states.into_iter().collect();
        self
    }

    pub fn with_public_ip(mut self, ip: Option<&str>) -> Self {
        self.public_ip = ip.map(|s| s.to_string());
        self
    }

    pub fn failing_on(self, op: MockOp) -> Self {
        self.lock().fail_on.push(op);
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, call: ProviderCall, op: MockOp) -> Result<()> {
        let mut st = self.lock();
        st.calls.push(call);
        if st.fail_on.contains(&op) {
            return Err(anyhow::anyhow!("mock provider: injected failure for {:?}", op));
        }
        Ok(())
    }

    fn next_of<T: Clone>(queue: &mut VecDeque<T>, fallback: T) -> T {
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(fallback)
        } else {
            queue.front().cloned().unwrap_or(fallback)
        }
    }

    fn current_instance(&self) -> Instance {
        let mut st = self.lock();
        let state = if st.terminated {
            InstanceState::Terminated
        } else {
            Self::next_of(&mut st.instance_states, InstanceState::Running)
        };
        Instance {
            id: self.instance_id.clone(),
            public_ip: self.public_ip.clone(),
            state,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run_instance(&self, spec: &LaunchSpec) -> Result<Instance> {
        self.record(
            ProviderCall::RunInstance {
                base_image: spec.base_image.clone(),
            },
            MockOp::RunInstance,
        )?;
        Ok(self.current_instance())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Instance> {
        self.record(
            ProviderCall::DescribeInstance {
                instance_id: instance_id.to_string(),
            },
            MockOp::DescribeInstance,
        )?;
        if instance_id != self.instance_id {
            return Err(anyhow::anyhow!("mock provider: unknown instance {}", instance_id));
        }
        Ok(self.current_instance())
    }

    async fn create_image(
        &self,
        instance_id: &str,
        name: &str,
        description: &str,
    ) -> Result<String> {
        self.record(
            ProviderCall::CreateImage {
                instance_id: instance_id.to_string(),
                name: name.to_string(),
            },
            MockOp::CreateImage,
        )?;
        let mut st = self.lock();
        st.image_name = Some(name.to_string());
        st.image_description = Some(description.to_string());
        Ok(self.image_id.clone())
    }

    async fn describe_image(&self, image_id: &str) -> Result<Image> {
        self.record(
            ProviderCall::DescribeImage {
                image_id: image_id.to_string(),
            },
            MockOp::DescribeImage,
        )?;
        let mut st = self.lock();
        let state = Self::next_of(&mut st.image_states, ImageState::Available);
        Ok(Image {
            id: image_id.to_string(),
            name: st.image_name.clone(),
            description: st.image_description.clone(),
            state,
        })
    }

    async fn tag_resource(&self, resource_id: &str, key: &str, value: &str) -> Result<()> {
        self.record(
            ProviderCall::TagResource {
                resource_id: resource_id.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
            MockOp::TagResource,
        )
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<bool> {
        self.record(
            ProviderCall::TerminateInstance {
                instance_id: instance_id.to_string(),
            },
            MockOp::TerminateInstance,
        )?;
        let mut st = self.lock();
        let was_live = !st.terminated;
        st.terminated = true;
        Ok(was_live)
    }
}
