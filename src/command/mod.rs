// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Assembly of the flavor-specific `mpirun` command line.

mod builder;
mod types;

pub use builder::{build, select_launcher, BuildContext, HOSTFILE_NAME, PIN_WRAPPER_NAME};
pub use types::{CommandSpec, StagedFile};
