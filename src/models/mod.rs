pub mod approval_action;
pub mod approval_workflow;
pub mod delivery_confirmation;
pub mod material_submittal;
pub mod purchase_order;
pub mod purchase_request;
pub mod vendor;

pub use approval_action::{ActionType, Model as ApprovalAction};
pub use approval_workflow::{
    ApproverList, Model as ApprovalWorkflow, SubjectType, WorkflowStatus, WorkflowType,
};
pub use delivery_confirmation::{ConfirmationStatus, Model as DeliveryConfirmation, PhotoRefs};
pub use material_submittal::{Model as MaterialSubmittal, SubmittalStatus};
pub use purchase_order::{Model as PurchaseOrder, PurchaseOrderStatus};
pub use purchase_request::{Model as PurchaseRequest, RequestStatus, Urgency};
pub use vendor::Model as Vendor;
