// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

pub mod fixture;
