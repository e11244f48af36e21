// RouteLab: A Discrete-Event IP/MPLS Control-Plane Simulator
// Copyright (C) 2022  The RouteLab Authors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

#[cfg(test)]
mod test_convergence;
#[cfg(test)]
mod test_forwarding;
#[cfg(test)]
mod test_mpls;
#[cfg(test)]
mod test_routing;
#[cfg(test)]
mod test_rsvp;
#[cfg(test)]
mod test_scheduler;
#[cfg(test)]
mod test_topology;
