pub mod object_id;
pub mod object_type;
pub mod property_id;
pub mod protocol;

pub use object_id::ObjectId;
pub use object_type::ObjectType;
pub use property_id::PropertyId;
pub use protocol::{ErrorClass, ErrorCode, MaxApdu, MaxSegments};
