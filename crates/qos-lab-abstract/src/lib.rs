pub mod config;
pub mod experiment;
pub mod flow;
pub mod interface;
pub mod policy;
pub mod topology;

pub use config::{
    ChannelConfig, ChannelConfigOverride, PointToPointParams, PointToPointParamsOverride,
    ScenarioParams, ScenarioParamsOverride,
};
pub use experiment::{Expectation, Experiment, Metric, Topology};
pub use flow::{Direction, FiveTuple, FlowCounters, FlowDescriptor, FlowKey};
pub use interface::{
    AddressSet, DeviceHandle, DeviceSet, EngineError, EngineSession, MacRole, MediumParams,
    NodeSet, SimulationEngine, SinkApp, SourceApp, Subnet,
};
pub use policy::{PolicyOverride, RateAdaptation, VariantPolicy};
pub use topology::{Bounds, MotionPolicy, NodeId, NodePlacement, NodeRole, Position};
