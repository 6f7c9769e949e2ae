mod lock_exclusion_case;
