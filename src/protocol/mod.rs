// SPDX-License-Identifier: GPL-3.0-or-later

mod instruction;
pub use instruction::*;

mod reader;
pub use reader::*;
