// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! RFC 2136 dynamic update processing against the zone record store.

mod pending;
mod transaction;

pub use self::pending::{PendingGuard, PendingRequests};
pub use self::transaction::UpdateTransaction;

use crate::proto::op::ResponseCode;

/// Result of a dynamic update operation: either success or the response code
/// to signal back to the requestor.
pub type UpdateResult<T> = Result<T, ResponseCode>;
