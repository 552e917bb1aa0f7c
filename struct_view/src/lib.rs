/* Struct View Library
 *
 * Binds record layouts to bytes. Views read and write members in place over
 * a caller-provided or freshly allocated buffer; record values are detached
 * object graphs converted to and from flat buffers by serialize/deserialize,
 * or to and from JSON.
 */

pub mod array;
pub mod codec;
pub mod json;
pub mod value;
pub mod view;

pub use array::{ArrayView, RecordArray};
pub use codec::{deserialize, serialize, size_of_value};
pub use json::{from_json, to_json};
pub use value::{CustomCodec, RecordValue, Value};
pub use view::RecordView;
