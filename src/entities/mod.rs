pub mod action;
pub mod policy;
pub mod policy_action_rel;
pub mod policy_resource_rel;
pub mod policy_subject_rel;
pub mod resource;
pub mod subject;

pub use action::Entity as Action;
pub use policy::Entity as Policy;
pub use policy_action_rel::Entity as PolicyActionRel;
pub use policy_resource_rel::Entity as PolicyResourceRel;
pub use policy_subject_rel::Entity as PolicySubjectRel;
pub use resource::Entity as Resource;
pub use subject::Entity as Subject;
